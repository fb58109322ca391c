use axum::{
    Json,
    extract::{Extension, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, GeneratedImageDto};
use crate::services::UserData;

#[derive(Debug, Deserialize)]
pub struct ImagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn default_limit() -> u64 {
    50
}

/// GET /api/my-images
pub async fn my_images(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserData>,
    Query(query): Query<ImagesQuery>,
) -> Result<Json<ApiResponse<Vec<GeneratedImageDto>>>, ApiError> {
    let images = state
        .auth_service()
        .list_images(user.id, query.limit.min(200))
        .await?;

    let images = images.into_iter().map(GeneratedImageDto::from).collect();

    Ok(Json(ApiResponse::success(images)))
}
