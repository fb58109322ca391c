use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiResponse, AppState, StatusResponse};

/// GET /
/// Liveness endpoint with basic service info.
pub async fn home(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatusResponse>> {
    let (backend, replicate_configured) = {
        let config = state.config().read().await;
        (
            config.generation.backend.clone(),
            !config.replicate.api_token.is_empty(),
        )
    };

    Json(ApiResponse::success(StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend,
        replicate_configured,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}
