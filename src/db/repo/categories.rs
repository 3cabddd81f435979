//! Category repository over `public.category`.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::CategoryStore;
use crate::db::context::Context;
use crate::db::error::DbError;
use crate::db::query::Order;
use crate::db::storage::Storage;
use crate::domain::Category;

const SCHEMA: &str = "public";
const TABLE: &str = "category";

const COLUMNS: [&str; 2] = ["id", "name"];

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    storage: Storage,
}

impl CategoryRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

fn scan_category(row: &PgRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
    })
}

#[async_trait]
impl CategoryStore for CategoryRepository {
    async fn all(&self, ctx: &Context) -> Result<Vec<Category>, DbError> {
        let query = self
            .storage
            .builder()
            .select(COLUMNS)
            .from(format!("{}.{}", SCHEMA, TABLE))
            .order_by("id", Order::Asc);

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_all(ctx, &query, scan_category).await
    }

    async fn get_by_id(&self, ctx: &Context, id: i32) -> Result<Category, DbError> {
        let query = self
            .storage
            .builder()
            .select(COLUMNS)
            .from(format!("{}.{}", SCHEMA, TABLE))
            .where_eq("id", id);

        let query = self.storage.render(TABLE, &query)?;
        self.storage.fetch_one(ctx, &query, scan_category).await
    }
}
