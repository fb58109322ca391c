use axum::{
    Json,
    extract::{Multipart, State},
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, CaptionResponse};

/// POST /api/image-to-text
/// Takes an `image` file and an optional `question` field.
pub async fn image_to_text(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<CaptionResponse>>, ApiError> {
    let mut image: Option<Vec<u8>> = None;
    let mut question: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read image: {e}")))?;
                image = Some(bytes.to_vec());
            }
            Some("question") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Failed to read question: {e}")))?;
                question = Some(text);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::validation("An image file is required"))?;

    let result = state
        .caption_service()
        .caption(&image, question.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(CaptionResponse {
        text: result.text,
        question: result.question,
    })))
}
