//! Image captioning and visual question answering through Replicate's BLIP
//! model. The image is inlined as a data URI since BLIP predictions accept
//! base64 input directly.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::clients::replicate::ReplicateClient;
use crate::config::Config;
use crate::services::generation::{GenerationError, map_replicate_error};

/// Phrases that mean "just caption it" rather than a real VQA query.
/// Matched by containment, so variants like "Describe this image in detail."
/// still select plain captioning.
const GENERIC_PROMPTS: &[&str] = &["describe this image", "what is in this image", "describe"];

#[derive(Debug, Clone, serde::Serialize)]
pub struct CaptionResult {
    pub text: Value,
    pub question: String,
}

pub struct CaptionService {
    config: Arc<RwLock<Config>>,
    replicate: Option<Arc<ReplicateClient>>,
}

impl CaptionService {
    #[must_use]
    pub const fn new(config: Arc<RwLock<Config>>, replicate: Option<Arc<ReplicateClient>>) -> Self {
        Self { config, replicate }
    }

    pub async fn caption(
        &self,
        image_bytes: &[u8],
        question: Option<&str>,
    ) -> Result<CaptionResult, GenerationError> {
        let Some(replicate) = self.replicate.as_ref() else {
            return Err(GenerationError::NotConfigured {
                service: "Replicate".to_string(),
                message: "set the REPLICATE_API_TOKEN environment variable".to_string(),
            });
        };

        if image_bytes.is_empty() {
            return Err(GenerationError::Validation(
                "An image is required".to_string(),
            ));
        }

        let question = question
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or("describe this image")
            .to_string();

        let (version, poll_interval, max_attempts) = {
            let config = self.config.read().await;
            (
                config.replicate.blip_version.clone(),
                Duration::from_secs(config.replicate.caption_poll_interval_seconds),
                config.replicate.caption_max_poll_attempts,
            )
        };

        let data_uri = format!("data:image/png;base64,{}", BASE64.encode(image_bytes));
        let input = build_blip_input(&data_uri, &question);

        info!(question = %question, "Requesting image caption");

        let prediction = replicate
            .create_prediction(&version, input)
            .await
            .map_err(map_replicate_error)?;

        let prediction = replicate
            .wait_for(&prediction.id, poll_interval, max_attempts)
            .await
            .map_err(map_replicate_error)?;

        let text = prediction
            .output
            .ok_or_else(|| GenerationError::Upstream {
                service: "Replicate".to_string(),
                message: "prediction succeeded but returned no output".to_string(),
            })?;

        Ok(CaptionResult { text, question })
    }
}

fn build_blip_input(data_uri: &str, question: &str) -> Value {
    if is_generic_prompt(question) {
        serde_json::json!({
            "image": data_uri,
            "task": "image_captioning",
        })
    } else {
        serde_json::json!({
            "image": data_uri,
            "task": "visual_question_answering",
            "question": question,
        })
    }
}

fn is_generic_prompt(question: &str) -> bool {
    let normalized = question.to_lowercase();
    GENERIC_PROMPTS.iter().any(|p| normalized.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_prompts_map_to_captioning() {
        let input = build_blip_input("data:image/png;base64,AA==", "Describe this image");
        assert_eq!(input["task"], "image_captioning");
        assert!(input["question"].is_null());
    }

    #[test]
    fn test_generic_prompt_variants_map_to_captioning() {
        // Containment, not equality: longer phrasings of the stock
        // questions still mean "just caption it".
        for question in [
            "Describe this image in detail.",
            "Please describe the scene",
            "What is in this image?",
        ] {
            let input = build_blip_input("data:image/png;base64,AA==", question);
            assert_eq!(input["task"], "image_captioning", "question: {question}");
        }
    }

    #[test]
    fn test_real_questions_map_to_vqa() {
        let input = build_blip_input("data:image/png;base64,AA==", "how many cats are there?");
        assert_eq!(input["task"], "visual_question_answering");
        assert_eq!(input["question"], "how many cats are there?");
    }
}
