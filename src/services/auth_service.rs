//! Domain service for registration, login, and session management.

use serde::Serialize;
use thiserror::Error;

use crate::db::GeneratedImageRecord;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username/email or password")]
    InvalidCredentials,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid or expired session")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// User info DTO for responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
}

impl From<crate::db::User> for UserData {
    fn from(user: crate::db::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
        }
    }
}

/// Login result: the user plus their freshly issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: UserData,
    pub session_token: String,
    pub expires_at: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Registers a new user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Conflict`] if the username or email is taken and
    /// [`AuthError::Validation`] for weak passwords or malformed input.
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<UserData, AuthError>;

    /// Verifies credentials and issues a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if login fails.
    async fn login(
        &self,
        identifier: &str,
        password: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<LoginResult, AuthError>;

    /// Resolves a session token to its user, checking expiry.
    async fn verify(&self, token: &str) -> Result<UserData, AuthError>;

    /// Invalidates a session token.
    async fn logout(&self, token: &str) -> Result<(), AuthError>;

    /// Lists a user's generated-image history, newest first.
    async fn list_images(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<GeneratedImageRecord>, AuthError>;
}
