//! Product repository over `public.product`.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::ProductStore;
use crate::db::context::Context;
use crate::db::error::DbError;
use crate::db::query::Value;
use crate::db::storage::Storage;
use crate::domain::{NewProduct, Product, ProductChanges, ProductSummary};

const SCHEMA: &str = "public";
const TABLE: &str = "product";

/// Columns selected by [`ProductRepository::all`], in scan order.
const SUMMARY_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "description",
    "image_id",
    "price",
    "currency_id",
    "created_at",
    "updated_at",
];

/// Columns of a full [`Product`], in scan order.
const COLUMNS: [&str; 11] = [
    "id",
    "name",
    "category_id",
    "description",
    "image_id",
    "price",
    "currency_id",
    "rating",
    "specifications",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone)]
pub struct ProductRepository {
    storage: Storage,
}

impl ProductRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn qualified_table() -> String {
        format!("{}.{}", SCHEMA, TABLE)
    }
}

fn scan_summary(row: &PgRow) -> Result<ProductSummary, sqlx::Error> {
    Ok(ProductSummary {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        description: row.try_get(2)?,
        image_id: row.try_get(3)?,
        price: row.try_get(4)?,
        currency_id: row.try_get(5)?,
        created_at: row.try_get(6)?,
        updated_at: row.try_get(7)?,
    })
}

fn scan_product(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        category_id: row.try_get(2)?,
        description: row.try_get(3)?,
        image_id: row.try_get(4)?,
        price: row.try_get(5)?,
        currency_id: row.try_get(6)?,
        rating: row.try_get(7)?,
        specifications: row.try_get(8)?,
        created_at: row.try_get(9)?,
        updated_at: row.try_get(10)?,
    })
}

/// Column assignments for the fields present in `changes`.
fn assignments(changes: &ProductChanges) -> Vec<(&'static str, Value)> {
    let mut set = Vec::new();
    if let Some(v) = &changes.name {
        set.push(("name", Value::from(v)));
    }
    if let Some(v) = changes.category_id {
        set.push(("category_id", Value::from(v)));
    }
    if let Some(v) = &changes.description {
        set.push(("description", Value::from(v)));
    }
    if let Some(v) = &changes.image_id {
        set.push(("image_id", Value::from(v)));
    }
    if let Some(v) = &changes.price {
        set.push(("price", Value::from(v)));
    }
    if let Some(v) = changes.currency_id {
        set.push(("currency_id", Value::from(v)));
    }
    if let Some(v) = &changes.rating {
        set.push(("rating", Value::from(v)));
    }
    if let Some(v) = &changes.specifications {
        set.push(("specifications", Value::from(v)));
    }
    set
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn all(&self, ctx: &Context) -> Result<Vec<ProductSummary>, DbError> {
        let query = self
            .storage
            .builder()
            .select(SUMMARY_COLUMNS)
            .from(Self::qualified_table());

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_all(ctx, &query, scan_summary).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &str) -> Result<Product, DbError> {
        let query = self
            .storage
            .builder()
            .select(COLUMNS)
            .from(Self::qualified_table())
            .where_eq("id", id);

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_one(ctx, &query, scan_product).await
    }

    async fn create(&self, ctx: &Context, product: &NewProduct) -> Result<Product, DbError> {
        let query = self
            .storage
            .builder()
            .insert(Self::qualified_table())
            .columns([
                "name",
                "category_id",
                "description",
                "image_id",
                "price",
                "currency_id",
                "rating",
                "specifications",
            ])
            .values([
                Value::from(&product.name),
                Value::from(product.category_id),
                Value::from(&product.description),
                Value::from(&product.image_id),
                Value::from(&product.price),
                Value::from(product.currency_id),
                Value::from(&product.rating),
                Value::from(&product.specifications),
            ])
            .returning(COLUMNS);

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_one(ctx, &query, scan_product).await
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &str,
        changes: &ProductChanges,
    ) -> Result<Product, DbError> {
        let mut query = self.storage.builder().update(Self::qualified_table());
        for (column, value) in assignments(changes) {
            query = query.set(column, value);
        }
        let query = query
            .set_current_timestamp("updated_at")
            .where_eq("id", id)
            .returning(COLUMNS);

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_one(ctx, &query, scan_product).await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), DbError> {
        let query = self
            .storage
            .builder()
            .delete(Self::qualified_table())
            .where_eq("id", id);

        let query = self.storage.render(TABLE, &query)?;
        match self.storage.execute(ctx, &query).await? {
            0 => {
                let err = DbError::not_found(&query);
                query.log_error(&err);
                Err(err)
            }
            _ => Ok(()),
        }
    }
}
