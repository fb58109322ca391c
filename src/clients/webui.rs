//! Client for the Stable Diffusion WebUI REST API
//! (`/sdapi/v1/txt2img` and `/sdapi/v1/img2img`).

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Payload accepted by both txt2img and img2img endpoints. The img2img-only
/// fields are skipped when unset so the same struct serves both modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    /// `-1` asks the WebUI to randomize.
    pub seed: i64,
    pub batch_size: u32,
    pub n_iter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f64>,
    /// Plain base64 strings, as the WebUI expects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ImageResponse {
    /// Base64-encoded PNGs. Other response fields are ignored.
    pub images: Vec<String>,
}

#[derive(Clone)]
pub struct WebUiClient {
    client: Client,
    base_url: String,
}

impl WebUiClient {
    #[must_use]
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn txt2img(&self, request: &ImageRequest) -> Result<ImageResponse> {
        self.send("/sdapi/v1/txt2img", request).await
    }

    pub async fn img2img(&self, request: &ImageRequest) -> Result<ImageResponse> {
        self.send("/sdapi/v1/img2img", request).await
    }

    async fn send(&self, path: &str, request: &ImageRequest) -> Result<ImageResponse> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Stable Diffusion WebUI at {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("WebUI error: {} - {}", status, body));
        }

        response
            .json()
            .await
            .context("Failed to parse WebUI response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txt2img_payload_omits_img2img_fields() {
        let request = ImageRequest {
            prompt: "a lighthouse at dusk".to_string(),
            steps: 30,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            sampler_name: "DPM++ 2M Karras".to_string(),
            seed: -1,
            batch_size: 1,
            n_iter: 1,
            ..ImageRequest::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["prompt"], "a lighthouse at dusk");
        assert_eq!(json["seed"], -1);
        assert!(json.get("init_images").is_none());
        assert!(json.get("denoising_strength").is_none());
    }

    #[test]
    fn test_img2img_payload_includes_init_images() {
        let request = ImageRequest {
            prompt: "watercolor version".to_string(),
            denoising_strength: Some(0.75),
            init_images: Some(vec!["aGVsbG8=".to_string()]),
            ..ImageRequest::default()
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["denoising_strength"], 0.75);
        assert_eq!(json["init_images"][0], "aGVsbG8=");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = WebUiClient::new(Client::new(), "http://127.0.0.1:7861/");
        assert_eq!(client.base_url, "http://127.0.0.1:7861");
    }
}
