use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::generated_images;

/// History row returned to the owning user.
#[derive(Debug, Clone)]
pub struct GeneratedImageRecord {
    pub id: i32,
    pub image_path: String,
    pub prompt: String,
    pub mode: String,
    pub created_at: String,
}

impl From<generated_images::Model> for GeneratedImageRecord {
    fn from(model: generated_images::Model) -> Self {
        Self {
            id: model.id,
            image_path: model.image_path,
            prompt: model.prompt,
            mode: model.mode,
            created_at: model.created_at,
        }
    }
}

pub struct ImageRepository {
    conn: DatabaseConnection,
}

impl ImageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(
        &self,
        user_id: i32,
        image_path: &str,
        prompt: &str,
        negative_prompt: &str,
        mode: &str,
        parameters: Option<String>,
    ) -> Result<()> {
        let active = generated_images::ActiveModel {
            user_id: Set(user_id),
            image_path: Set(image_path.to_string()),
            prompt: Set(prompt.to_string()),
            negative_prompt: Set(negative_prompt.to_string()),
            mode: Set(mode.to_string()),
            parameters: Set(parameters),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to record generated image")?;

        Ok(())
    }

    /// List a user's generated images, newest first.
    pub async fn list_for_user(&self, user_id: i32, limit: u64) -> Result<Vec<GeneratedImageRecord>> {
        let rows = generated_images::Entity::find()
            .filter(generated_images::Column::UserId.eq(user_id))
            .order_by_desc(generated_images::Column::CreatedAt)
            .order_by_desc(generated_images::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list generated images")?;

        Ok(rows.into_iter().map(GeneratedImageRecord::from).collect())
    }
}
