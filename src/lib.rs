pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::Config;
pub use db::{
    CategoryRepository, CategoryStore, ConnectionConfig, Context, DbError, ErrorKind,
    ProductRepository, ProductStore, Storage,
};
pub use domain::{Category, NewProduct, Product, ProductChanges, ProductSummary};
pub use error::AppError;
