//! Database access layer for PostgreSQL.
//!
//! This module provides:
//! - Connection establishment with bounded retry (`client`)
//! - Classification of driver failures into stable kinds (`error`)
//! - Cancellable per-call contexts (`context`)
//! - Value-style query builders (`query`)
//! - The shared execute/scan/release path (`storage`)
//! - Per-entity repositories (`repo`)

pub mod client;
pub mod context;
pub mod error;
pub mod query;
pub mod repo;
pub mod storage;

pub use client::{connect, ConnectError, ConnectionConfig, PoolSettings, RetryPolicy};
pub use context::Context;
pub use error::{classify, DbError, ErrorKind};
pub use query::{StatementBuilder, Value};
pub use repo::{
    CategoryRepository, CategoryStore, HealthCheck, ProductRepository, ProductStore,
};
pub use storage::{QueryContext, Storage};
