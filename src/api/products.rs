use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::api::AppState;
use crate::domain::{NewProduct, Product, ProductChanges, ProductSummary};
use crate::error::AppError;

pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductSummary>>, AppError> {
    let products = state.products.all(&state.context()).await?;
    Ok(Json(products))
}

pub async fn get_product(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Product>, AppError> {
    let product = state.products.get_by_id(&state.context(), &id).await?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<NewProduct>,
) -> Result<impl IntoResponse, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    if body.price.trim().is_empty() {
        return Err(AppError::BadRequest("price must not be empty".into()));
    }

    let product = state.products.create(&state.context(), &body).await?;
    let location = format!("/v1/products/{}", product.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(product)))
}

pub async fn update_product(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(changes): Json<ProductChanges>,
) -> Result<Json<Product>, AppError> {
    if changes.is_empty() {
        return Err(AppError::BadRequest("no fields to update".into()));
    }
    if changes.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }

    let product = state
        .products
        .update(&state.context(), &id, &changes)
        .await?;
    Ok(Json(product))
}

pub async fn delete_product(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.products.delete(&state.context(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
