pub mod categories;
pub mod health;
pub mod products;

use crate::db::{CategoryStore, Context, HealthCheck, ProductStore};
use axum::http::header::{
    ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE,
    LOCATION, ORIGIN,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub health: Arc<dyn HealthCheck>,
    pub query_timeout: Duration,
}

impl AppState {
    pub fn new(
        products: Arc<dyn ProductStore>,
        categories: Arc<dyn CategoryStore>,
        health: Arc<dyn HealthCheck>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            products,
            categories,
            health,
            query_timeout,
        }
    }

    /// Per-request context bounding every query issued by a handler.
    pub fn context(&self) -> Context {
        Context::with_timeout(self.query_timeout)
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_credentials(true)
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            CONTENT_LENGTH,
            ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LOCATION, AUTHORIZATION, CONTENT_DISPOSITION])
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/api/heartbeat", get(health::heartbeat))
        .route(
            "/v1/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/v1/products/:id",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route("/v1/categories", get(categories::list_categories))
        .route("/v1/categories/:id", get(categories::get_category))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}
