use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};

use crate::db::repositories::user::User;
use crate::entities::{sessions, users};

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_token: String,
    pub expires_at: String,
}

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issue a new random session token for a user.
    pub async fn create(
        &self,
        user_id: i32,
        ttl_days: i64,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<NewSession> {
        let token = generate_session_token();
        let now = Utc::now();
        let expires_at = (now + Duration::days(ttl_days)).to_rfc3339();

        let active = sessions::ActiveModel {
            user_id: Set(user_id),
            session_token: Set(token.clone()),
            expires_at: Set(expires_at.clone()),
            ip_address: Set(ip_address.map(ToString::to_string)),
            user_agent: Set(user_agent.map(ToString::to_string)),
            created_at: Set(now.to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert session")?;

        Ok(NewSession {
            session_token: token,
            expires_at,
        })
    }

    /// Resolve a token to its user. Returns `None` for unknown or expired
    /// tokens, or when the account has since been deactivated.
    pub async fn verify(&self, token: &str) -> Result<Option<User>> {
        let session = sessions::Entity::find()
            .filter(sessions::Column::SessionToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query session by token")?;

        let Some(session) = session else {
            return Ok(None);
        };

        if !is_still_valid(&session.expires_at) {
            return Ok(None);
        }

        let user = session
            .find_related(users::Entity)
            .filter(users::Column::IsActive.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to load session user")?;

        Ok(user.map(User::from))
    }

    /// Delete the session for a token. Returns whether a row was removed.
    pub async fn delete(&self, token: &str) -> Result<bool> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::SessionToken.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected > 0)
    }

    /// Remove all sessions whose expiry has passed.
    pub async fn purge_expired(&self) -> Result<u64> {
        // RFC 3339 timestamps in UTC compare correctly as strings.
        let now = Utc::now().to_rfc3339();

        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired sessions")?;

        Ok(result.rows_affected)
    }
}

fn is_still_valid(expires_at: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(expires_at)
        .map(|expiry| expiry > Utc::now())
        .unwrap_or(false)
}

/// Generate a random session token (64 character hex string)
#[must_use]
pub fn generate_session_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_session_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn test_expiry_comparison() {
        let future = (Utc::now() + Duration::days(1)).to_rfc3339();
        let past = (Utc::now() - Duration::seconds(1)).to_rfc3339();

        assert!(is_still_valid(&future));
        assert!(!is_still_valid(&past));
        assert!(!is_still_valid("not-a-timestamp"));
    }
}
