use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::image::GeneratedImageRecord;
pub use repositories::session::NewSession;
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    fn image_repo(&self) -> repositories::image::ImageRepository {
        repositories::image::ImageRepository::new(self.conn.clone())
    }

    pub async fn user_identifier_taken(&self, username: &str, email: &str) -> Result<bool> {
        self.user_repo().identifier_taken(username, email).await
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        full_name: Option<&str>,
        config: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(username, email, password, full_name, config)
            .await
    }

    pub async fn verify_user_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.user_repo().verify_password(identifier, password).await
    }

    pub async fn touch_last_login(&self, user_id: i32) -> Result<()> {
        self.user_repo().touch_last_login(user_id).await
    }

    pub async fn create_session(
        &self,
        user_id: i32,
        ttl_days: i64,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<NewSession> {
        self.session_repo()
            .create(user_id, ttl_days, ip_address, user_agent)
            .await
    }

    pub async fn verify_session(&self, token: &str) -> Result<Option<User>> {
        self.session_repo().verify(token).await
    }

    pub async fn delete_session(&self, token: &str) -> Result<bool> {
        self.session_repo().delete(token).await
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.session_repo().purge_expired().await
    }

    pub async fn record_generated_image(
        &self,
        user_id: i32,
        image_path: &str,
        prompt: &str,
        negative_prompt: &str,
        mode: &str,
        parameters: Option<String>,
    ) -> Result<()> {
        self.image_repo()
            .record(user_id, image_path, prompt, negative_prompt, mode, parameters)
            .await
    }

    pub async fn list_generated_images(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<GeneratedImageRecord>> {
        self.image_repo().list_for_user(user_id, limit).await
    }
}
