//! Client for the Replicate.com prediction API.
//!
//! Predictions are created with a pinned model version, then polled until
//! they reach a terminal status. There is no retry or backoff beyond the
//! fixed polling loop with a hard attempt cap.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicateError {
    #[error("Replicate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Replicate API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Prediction failed: {0}")]
    Failed(String),

    #[error("Prediction did not finish within {attempts} polls")]
    TimedOut { attempts: u32 },
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// First HTTP URL in the prediction output, whether the output is a bare
    /// string or a list of strings.
    #[must_use]
    pub fn first_output_url(&self) -> Option<String> {
        fn pick(value: &Value) -> Option<String> {
            match value {
                Value::String(url) if url.trim().starts_with("http") => {
                    Some(url.trim().to_string())
                }
                Value::Array(items) => items.iter().find_map(pick),
                _ => None,
            }
        }

        self.output.as_ref().and_then(pick)
    }
}

#[derive(Clone)]
pub struct ReplicateClient {
    client: Client,
    api_base: String,
    token: String,
}

impl ReplicateClient {
    #[must_use]
    pub fn new(client: Client, api_base: &str, token: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Start a prediction for a pinned model version.
    pub async fn create_prediction(
        &self,
        version: &str,
        input: Value,
    ) -> Result<Prediction, ReplicateError> {
        let url = format!("{}/predictions", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.token))
            .json(&serde_json::json!({
                "version": version,
                "input": input,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReplicateError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    pub async fn get_prediction(&self, id: &str) -> Result<Prediction, ReplicateError> {
        let url = format!("{}/predictions/{}", self.api_base, id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReplicateError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    /// Poll a prediction until it succeeds, fails, or the attempt cap is hit.
    pub async fn wait_for(
        &self,
        id: &str,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<Prediction, ReplicateError> {
        for _ in 0..max_attempts {
            tokio::time::sleep(poll_interval).await;

            let prediction = self.get_prediction(id).await?;
            match prediction.status.as_str() {
                "succeeded" => return Ok(prediction),
                "failed" | "canceled" => {
                    let detail = prediction
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| prediction.status);
                    return Err(ReplicateError::Failed(detail));
                }
                _ => {}
            }
        }

        Err(ReplicateError::TimedOut {
            attempts: max_attempts,
        })
    }

    /// Download a prediction output file.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ReplicateError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReplicateError::Api { status, body });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction_with_output(output: Value) -> Prediction {
        Prediction {
            id: "p1".to_string(),
            status: "succeeded".to_string(),
            output: Some(output),
            error: None,
        }
    }

    #[test]
    fn test_first_output_url_from_list() {
        let prediction = prediction_with_output(serde_json::json!([
            "https://replicate.delivery/pbxt/abc/out-0.png",
            "https://replicate.delivery/pbxt/abc/out-1.png"
        ]));
        assert_eq!(
            prediction.first_output_url().as_deref(),
            Some("https://replicate.delivery/pbxt/abc/out-0.png")
        );
    }

    #[test]
    fn test_first_output_url_from_string() {
        let prediction =
            prediction_with_output(Value::String("https://example.com/x.png".to_string()));
        assert_eq!(
            prediction.first_output_url().as_deref(),
            Some("https://example.com/x.png")
        );
    }

    #[test]
    fn test_first_output_url_ignores_non_urls() {
        let prediction = prediction_with_output(serde_json::json!(["a caption, not a url"]));
        assert!(prediction.first_output_url().is_none());
    }
}
