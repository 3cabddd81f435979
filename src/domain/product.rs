//! Product records.

use serde::{Deserialize, Serialize};

/// A full product row.
///
/// Text columns are carried as strings so values cross the storage boundary
/// without coercion. Category and currency references are integer keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category_id: i32,
    pub description: String,
    pub image_id: String,
    pub price: String,
    pub currency_id: i32,
    pub rating: String,
    pub specifications: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing projection of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image_id: String,
    pub price: String,
    pub currency_id: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductSummary {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            image_id: p.image_id,
            price: p.price,
            currency_id: p.currency_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Fields supplied when creating a product. Identity and timestamps are
/// assigned by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category_id: i32,
    pub description: String,
    pub image_id: String,
    pub price: String,
    pub currency_id: i32,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub specifications: String,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub category_id: Option<i32>,
    pub description: Option<String>,
    pub image_id: Option<String>,
    pub price: Option<String>,
    pub currency_id: Option<i32>,
    pub rating: Option<String>,
    pub specifications: Option<String>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
