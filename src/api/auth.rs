use axum::{
    Form, Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
};
use crate::services::UserData;

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware for routes that require a logged-in user.
/// Resolves the `Authorization: Bearer <token>` header against the sessions
/// table and stashes the user in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    let user = state.auth_service().verify(&token).await?;

    tracing::Span::current().record("user_id", user.id);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Resolve the caller if a valid bearer token is present; anonymous callers
/// get `None` rather than an error.
pub async fn authenticate_optional(state: &AppState, headers: &HeaderMap) -> Option<UserData> {
    let token = bearer_token(headers)?;
    state.auth_service().verify(&token).await.ok()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(ToString::to_string)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<RegisterRequest>,
) -> Result<Json<ApiResponse<UserData>>, ApiError> {
    let user = state
        .auth_service()
        .register(
            &payload.username,
            &payload.email,
            &payload.password,
            payload.full_name.as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/login
/// Accepts a username or email plus password, returns a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(payload): Form<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username or email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let result = state
        .auth_service()
        .login(
            &payload.username,
            &payload.password,
            client_ip(&headers).as_deref(),
            user_agent(&headers).as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::success(LoginResponse::from(result))))
}

/// GET /api/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<UserData>>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    let user = state.auth_service().verify(&token).await?;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state.auth_service().logout(&token).await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Logged out successfully".to_string(),
    })))
}
