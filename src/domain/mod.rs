//! Entity records returned by the repositories.

pub mod category;
pub mod product;

pub use category::Category;
pub use product::{NewProduct, Product, ProductChanges, ProductSummary};
