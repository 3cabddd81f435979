use axum::extract::{Path, State};
use axum::Json;

use crate::api::AppState;
use crate::domain::Category;
use crate::error::AppError;

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = state.categories.all(&state.context()).await?;
    Ok(Json(categories))
}

pub async fn get_category(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<Category>, AppError> {
    let category = state.categories.get_by_id(&state.context(), id).await?;
    Ok(Json(category))
}
