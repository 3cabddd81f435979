//! Entity repositories.
//!
//! Each repository pairs a fixed `schema.table` and column list with the shared
//! [`Storage`](crate::db::Storage) execution path. HTTP handlers depend on the
//! store traits so they can run against the in-memory mocks in tests.

mod categories;
pub mod mock;
mod products;

use async_trait::async_trait;

use super::context::Context;
use super::error::DbError;
use super::storage::Storage;
use crate::domain::{Category, NewProduct, Product, ProductChanges, ProductSummary};

pub use categories::CategoryRepository;
pub use mock::{MockCategoryStore, MockHealthCheck, MockProductStore};
pub use products::ProductRepository;

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every product, as listing projections.
    async fn all(&self, ctx: &Context) -> Result<Vec<ProductSummary>, DbError>;

    async fn get_by_id(&self, ctx: &Context, id: &str) -> Result<Product, DbError>;

    async fn create(&self, ctx: &Context, product: &NewProduct) -> Result<Product, DbError>;

    /// Apply `changes` and refresh `updated_at`.
    async fn update(
        &self,
        ctx: &Context,
        id: &str,
        changes: &ProductChanges,
    ) -> Result<Product, DbError>;

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), DbError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn all(&self, ctx: &Context) -> Result<Vec<Category>, DbError>;

    async fn get_by_id(&self, ctx: &Context, id: i32) -> Result<Category, DbError>;
}

/// Datastore reachability, used by the readiness check.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self, ctx: &Context) -> Result<(), DbError>;
}

#[async_trait]
impl HealthCheck for Storage {
    async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        Storage::ping(self, ctx).await
    }
}
