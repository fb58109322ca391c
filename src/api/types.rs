use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::{LoginResult, UserData};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// The `username` field accepts either a username or an email address.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserData,
    pub session_token: String,
    pub expires_at: String,
}

impl From<LoginResult> for LoginResponse {
    fn from(result: LoginResult) -> Self {
        Self {
            user: result.user,
            session_token: result.session_token,
            expires_at: result.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub message: String,
    pub image: String,
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub text: Value,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct GeneratedImageDto {
    pub id: i32,
    pub image_path: String,
    pub prompt: String,
    pub mode: String,
    pub created_at: String,
}

impl From<crate::db::GeneratedImageRecord> for GeneratedImageDto {
    fn from(record: crate::db::GeneratedImageRecord) -> Self {
        Self {
            id: record.id,
            image_path: record.image_path,
            prompt: record.prompt,
            mode: record.mode,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub replicate_configured: bool,
    pub uptime_seconds: u64,
}
