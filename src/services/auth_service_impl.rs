//! `SeaORM` implementation of the `AuthService` trait.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::{GeneratedImageRecord, Store};
use crate::services::auth_service::{AuthError, AuthService, LoginResult, UserData};
use async_trait::async_trait;

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, config: Arc<RwLock<Config>>) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<UserData, AuthError> {
        let security = self.config.read().await.security.clone();

        if username.trim().is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }
        if email.trim().is_empty() || !email.contains('@') {
            return Err(AuthError::Validation(
                "A valid email address is required".to_string(),
            ));
        }
        if password.len() < security.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                security.min_password_length
            )));
        }

        if self.store.user_identifier_taken(username, email).await? {
            return Err(AuthError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let user = self
            .store
            .create_user(username, email, password, full_name, &security)
            .await?;

        tracing::info!("Registered new user: {username}");

        Ok(UserData::from(user))
    }

    async fn login(
        &self,
        identifier: &str,
        password: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<LoginResult, AuthError> {
        let user = self
            .store
            .verify_user_password(identifier, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let ttl_days = self.config.read().await.security.session_ttl_days;

        let session = self
            .store
            .create_session(user.id, ttl_days, ip_address, user_agent)
            .await?;

        self.store.touch_last_login(user.id).await?;

        tracing::info!("User logged in: {}", user.username);

        Ok(LoginResult {
            user: UserData::from(user),
            session_token: session.session_token,
            expires_at: session.expires_at,
        })
    }

    async fn verify(&self, token: &str) -> Result<UserData, AuthError> {
        let user = self
            .store
            .verify_session(token)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        Ok(UserData::from(user))
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let deleted = self.store.delete_session(token).await?;

        if !deleted {
            return Err(AuthError::Validation("Session not found".to_string()));
        }

        Ok(())
    }

    async fn list_images(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<GeneratedImageRecord>, AuthError> {
        Ok(self.store.list_generated_images(user_id, limit).await?)
    }
}
