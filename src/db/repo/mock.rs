//! In-memory stores for testing without a database.
//!
//! The mocks enforce the same constraints the schema does (unique product
//! names, category references) and report violations with the same
//! [`ErrorKind`]s the classifier produces for real driver errors.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CategoryStore, HealthCheck, ProductStore};
use crate::db::context::Context;
use crate::db::error::{DbError, ErrorKind};
use crate::db::query::Value;
use crate::db::storage::QueryContext;
use crate::domain::{Category, NewProduct, Product, ProductChanges, ProductSummary};

/// Timestamp for the `tick`-th write, so every write is strictly later.
fn mock_timestamp(tick: u64) -> String {
    format!("2024-01-01 00:00:00.{:06}+00", tick)
}

fn mock_context(table: &'static str, op: &str, args: Vec<Value>) -> QueryContext {
    QueryContext::new(format!("mock {} on {}", op, table), table, args)
}

fn violation(kind: ErrorKind, message: &str, context: QueryContext) -> DbError {
    DbError::Execution {
        kind,
        source: sqlx::Error::Protocol(message.to_string()),
        context,
    }
}

#[derive(Debug, Default)]
struct ProductState {
    products: Vec<Product>,
    next_id: u64,
    ticks: u64,
}

impl ProductState {
    fn tick(&mut self) -> String {
        self.ticks += 1;
        mock_timestamp(self.ticks)
    }
}

/// Mock product store backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MockProductStore {
    state: Mutex<ProductState>,
    category_ids: Option<Vec<i32>>,
    failure: Option<ErrorKind>,
    cancelled: bool,
}

impl MockProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product.
    pub fn with_product(self, product: Product) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.next_id += 1;
            state.products.push(product);
        }
        self
    }

    /// Restrict `category_id` to these ids; others are foreign-key violations.
    pub fn with_categories(mut self, ids: Vec<i32>) -> Self {
        self.category_ids = Some(ids);
        self
    }

    /// Fail every call with an execution error of `kind`.
    pub fn with_failure(mut self, kind: ErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }

    /// Fail every call as if the caller's context had fired.
    pub fn with_cancellation(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn len(&self) -> usize {
        self.lock().products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProductState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, ctx: &Context, context: &QueryContext) -> Result<(), DbError> {
        if self.cancelled || ctx.is_cancelled() {
            return Err(DbError::Cancelled {
                context: context.clone(),
            });
        }
        match self.failure {
            Some(kind) => Err(violation(kind, "injected failure", context.clone())),
            None => Ok(()),
        }
    }

    fn check_category(&self, id: i32, context: &QueryContext) -> Result<(), DbError> {
        match &self.category_ids {
            Some(ids) if !ids.contains(&id) => Err(violation(
                ErrorKind::ForeignKeyViolation,
                "category does not exist",
                context.clone(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ProductStore for MockProductStore {
    async fn all(&self, ctx: &Context) -> Result<Vec<ProductSummary>, DbError> {
        let context = mock_context("product", "all", Vec::new());
        self.check(ctx, &context)?;
        Ok(self
            .lock()
            .products
            .iter()
            .cloned()
            .map(ProductSummary::from)
            .collect())
    }

    async fn get_by_id(&self, ctx: &Context, id: &str) -> Result<Product, DbError> {
        let context = mock_context("product", "get_by_id", vec![Value::from(id)]);
        self.check(ctx, &context)?;
        self.lock()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found(&context))
    }

    async fn create(&self, ctx: &Context, product: &NewProduct) -> Result<Product, DbError> {
        let context = mock_context("product", "create", vec![Value::from(&product.name)]);
        self.check(ctx, &context)?;
        self.check_category(product.category_id, &context)?;

        let mut state = self.lock();
        if state.products.iter().any(|p| p.name == product.name) {
            return Err(violation(
                ErrorKind::UniqueViolation,
                "duplicate product name",
                context,
            ));
        }
        state.next_id += 1;
        let now = state.tick();
        let created = Product {
            id: format!("p-{}", state.next_id),
            name: product.name.clone(),
            category_id: product.category_id,
            description: product.description.clone(),
            image_id: product.image_id.clone(),
            price: product.price.clone(),
            currency_id: product.currency_id,
            rating: product.rating.clone(),
            specifications: product.specifications.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        state.products.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &str,
        changes: &ProductChanges,
    ) -> Result<Product, DbError> {
        let context = mock_context("product", "update", vec![Value::from(id)]);
        self.check(ctx, &context)?;
        if let Some(category_id) = changes.category_id {
            self.check_category(category_id, &context)?;
        }

        let mut state = self.lock();
        if let Some(name) = &changes.name {
            if state.products.iter().any(|p| p.id != id && &p.name == name) {
                return Err(violation(
                    ErrorKind::UniqueViolation,
                    "duplicate product name",
                    context,
                ));
            }
        }
        let now = state.tick();
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DbError::not_found(&context))?;
        product.updated_at = now;

        if let Some(v) = &changes.name {
            product.name = v.clone();
        }
        if let Some(v) = changes.category_id {
            product.category_id = v;
        }
        if let Some(v) = &changes.description {
            product.description = v.clone();
        }
        if let Some(v) = &changes.image_id {
            product.image_id = v.clone();
        }
        if let Some(v) = &changes.price {
            product.price = v.clone();
        }
        if let Some(v) = changes.currency_id {
            product.currency_id = v;
        }
        if let Some(v) = &changes.rating {
            product.rating = v.clone();
        }
        if let Some(v) = &changes.specifications {
            product.specifications = v.clone();
        }
        Ok(product.clone())
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), DbError> {
        let context = mock_context("product", "delete", vec![Value::from(id)]);
        self.check(ctx, &context)?;
        let mut state = self.lock();
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Err(DbError::not_found(&context));
        }
        Ok(())
    }
}

/// Mock category store.
#[derive(Debug, Clone, Default)]
pub struct MockCategoryStore {
    categories: Vec<Category>,
}

impl MockCategoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, id: i32, name: &str) -> Self {
        self.categories.push(Category {
            id,
            name: name.to_string(),
        });
        self
    }
}

#[async_trait]
impl CategoryStore for MockCategoryStore {
    async fn all(&self, ctx: &Context) -> Result<Vec<Category>, DbError> {
        if ctx.is_cancelled() {
            return Err(DbError::Cancelled {
                context: mock_context("category", "all", Vec::new()),
            });
        }
        Ok(self.categories.clone())
    }

    async fn get_by_id(&self, _ctx: &Context, id: i32) -> Result<Category, DbError> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| {
                DbError::not_found(&mock_context("category", "get_by_id", vec![Value::from(id)]))
            })
    }
}

/// Health check with a fixed outcome.
#[derive(Debug, Clone, Default)]
pub struct MockHealthCheck {
    down: bool,
}

impl MockHealthCheck {
    pub fn up() -> Self {
        Self { down: false }
    }

    pub fn down() -> Self {
        Self { down: true }
    }
}

#[async_trait]
impl HealthCheck for MockHealthCheck {
    async fn ping(&self, _ctx: &Context) -> Result<(), DbError> {
        if self.down {
            return Err(violation(
                ErrorKind::Unclassified,
                "connection refused",
                mock_context("", "ping", Vec::new()),
            ));
        }
        Ok(())
    }
}
