//! Forwards generation requests to the configured backend (local Stable
//! Diffusion WebUI or Replicate), saves the resulting PNG, and records it in
//! the caller's history when authenticated.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clients::replicate::{ReplicateClient, ReplicateError};
use crate::clients::webui::{ImageRequest, WebUiClient};
use crate::config::Config;
use crate::db::Store;
use crate::services::auth_service::UserData;

/// Replicate runs SDXL slowly; the original service caps steps for speed.
const REPLICATE_MAX_STEPS: u32 = 50;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("{service} is not configured: {message}")]
    NotConfigured { service: String, message: String },

    #[error("{service} error: {message}")]
    Upstream { service: String, message: String },

    #[error("Generation timed out: {0}")]
    TimedOut(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Txt2Img,
    Img2Img,
}

impl Mode {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "txt2img" => Some(Self::Txt2Img),
            "img2img" => Some(Self::Img2Img),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Txt2Img => "txt2img",
            Self::Img2Img => "img2img",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    pub seed: i64,
    pub batch_size: u32,
    pub n_iter: u32,
    pub mode: Mode,
    pub denoising_strength: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GeneratedImage {
    pub image: String,
    pub file: String,
}

pub struct GenerationService {
    config: Arc<RwLock<Config>>,
    webui: Arc<WebUiClient>,
    replicate: Option<Arc<ReplicateClient>>,
    store: Store,
}

impl GenerationService {
    #[must_use]
    pub const fn new(
        config: Arc<RwLock<Config>>,
        webui: Arc<WebUiClient>,
        replicate: Option<Arc<ReplicateClient>>,
        store: Store,
    ) -> Self {
        Self {
            config,
            webui,
            replicate,
            store,
        }
    }

    pub async fn generate(
        &self,
        params: GenerateParams,
        init_image: Option<Vec<u8>>,
        user: Option<&UserData>,
    ) -> Result<GeneratedImage, GenerationError> {
        if params.prompt.trim().is_empty() {
            return Err(GenerationError::Validation("Prompt is required".to_string()));
        }
        if params.mode == Mode::Img2Img && init_image.is_none() {
            return Err(GenerationError::Validation(
                "img2img mode requires an init image".to_string(),
            ));
        }

        let backend = self.config.read().await.generation.backend.clone();

        info!(
            mode = params.mode.as_str(),
            backend = %backend,
            "Generating image for prompt: {:.50}",
            params.prompt
        );

        let image_base64 = match backend.as_str() {
            "replicate" => self.generate_replicate(&params).await?,
            _ => self.generate_webui(&params, init_image).await?,
        };

        let bytes = BASE64
            .decode(&image_base64)
            .map_err(|e| GenerationError::Upstream {
                service: "Image backend".to_string(),
                message: format!("returned invalid base64: {e}"),
            })?;

        let file = self.save_output(&bytes).await?;

        if let Some(user) = user {
            let parameters = parameters_json(&params, &backend);
            if let Err(e) = self
                .store
                .record_generated_image(
                    user.id,
                    &file,
                    &params.prompt,
                    &params.negative_prompt,
                    params.mode.as_str(),
                    Some(parameters.to_string()),
                )
                .await
            {
                // History is best-effort; the image itself was produced.
                warn!("Failed to record generated image: {e}");
            }
        }

        Ok(GeneratedImage {
            image: image_base64,
            file,
        })
    }

    async fn generate_webui(
        &self,
        params: &GenerateParams,
        init_image: Option<Vec<u8>>,
    ) -> Result<String, GenerationError> {
        let request = ImageRequest {
            prompt: params.prompt.clone(),
            negative_prompt: params.negative_prompt.clone(),
            steps: params.steps,
            cfg_scale: params.cfg_scale,
            width: params.width,
            height: params.height,
            sampler_name: params.sampler_name.clone(),
            seed: params.seed,
            batch_size: params.batch_size,
            n_iter: params.n_iter,
            denoising_strength: (params.mode == Mode::Img2Img).then_some(params.denoising_strength),
            init_images: init_image.map(|bytes| vec![BASE64.encode(bytes)]),
        };

        let response = match params.mode {
            Mode::Txt2Img => self.webui.txt2img(&request).await,
            Mode::Img2Img => self.webui.img2img(&request).await,
        }
        .map_err(|e| GenerationError::Upstream {
            service: "Stable Diffusion WebUI".to_string(),
            message: e.to_string(),
        })?;

        response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Upstream {
                service: "Stable Diffusion WebUI".to_string(),
                message: "no image returned".to_string(),
            })
    }

    async fn generate_replicate(&self, params: &GenerateParams) -> Result<String, GenerationError> {
        let Some(replicate) = self.replicate.as_ref() else {
            return Err(GenerationError::NotConfigured {
                service: "Replicate".to_string(),
                message: "set the REPLICATE_API_TOKEN environment variable".to_string(),
            });
        };

        let (version, poll_interval, max_attempts) = {
            let config = self.config.read().await;
            (
                config.replicate.sdxl_version.clone(),
                Duration::from_secs(config.replicate.poll_interval_seconds),
                config.replicate.max_poll_attempts,
            )
        };

        let prediction = replicate
            .create_prediction(&version, build_sdxl_input(params))
            .await
            .map_err(map_replicate_error)?;

        let prediction = replicate
            .wait_for(&prediction.id, poll_interval, max_attempts)
            .await
            .map_err(map_replicate_error)?;

        let url = prediction
            .first_output_url()
            .ok_or_else(|| GenerationError::Upstream {
                service: "Replicate".to_string(),
                message: "prediction succeeded but returned no output".to_string(),
            })?;

        let bytes = replicate.download(&url).await.map_err(map_replicate_error)?;

        Ok(BASE64.encode(bytes))
    }

    async fn save_output(&self, bytes: &[u8]) -> Result<String, GenerationError> {
        let output_path = self.config.read().await.general.output_path.clone();

        tokio::fs::create_dir_all(&output_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create output directory: {e}"))?;

        let file_name = format!("{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"));
        let path = Path::new(&output_path).join(&file_name);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save image: {e}"))?;

        info!("Image saved to {}", path.display());

        Ok(path.to_string_lossy().into_owned())
    }
}

pub(crate) fn map_replicate_error(err: ReplicateError) -> GenerationError {
    match err {
        ReplicateError::TimedOut { attempts } => {
            GenerationError::TimedOut(format!("gave up after {attempts} polls"))
        }
        other => GenerationError::Upstream {
            service: "Replicate".to_string(),
            message: other.to_string(),
        },
    }
}

/// Input for the pinned SDXL model. `seed == -1` means "randomize" to the
/// WebUI but must simply be omitted for Replicate.
fn build_sdxl_input(params: &GenerateParams) -> Value {
    serde_json::json!({
        "prompt": params.prompt,
        "negative_prompt": params.negative_prompt,
        "num_inference_steps": params.steps.min(REPLICATE_MAX_STEPS),
        "guidance_scale": params.cfg_scale,
        "width": params.width,
        "height": params.height,
        "seed": (params.seed != -1).then_some(params.seed),
    })
}

fn parameters_json(params: &GenerateParams, backend: &str) -> Value {
    serde_json::json!({
        "backend": backend,
        "steps": params.steps,
        "cfg_scale": params.cfg_scale,
        "width": params.width,
        "height": params.height,
        "sampler_name": params.sampler_name,
        "seed": params.seed,
        "batch_size": params.batch_size,
        "n_iter": params.n_iter,
        "denoising_strength": (params.mode == Mode::Img2Img).then_some(params.denoising_strength),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: Mode) -> GenerateParams {
        GenerateParams {
            prompt: "a red fox".to_string(),
            negative_prompt: String::new(),
            steps: 80,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            sampler_name: "DPM++ 2M Karras".to_string(),
            seed: -1,
            batch_size: 1,
            n_iter: 1,
            mode,
            denoising_strength: 0.75,
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("txt2img"), Some(Mode::Txt2Img));
        assert_eq!(Mode::parse("img2img"), Some(Mode::Img2Img));
        assert_eq!(Mode::parse("inpaint"), None);
    }

    #[test]
    fn test_sdxl_input_caps_steps_and_omits_random_seed() {
        let input = build_sdxl_input(&params(Mode::Txt2Img));
        assert_eq!(input["num_inference_steps"], 50);
        assert!(input["seed"].is_null());
    }

    #[test]
    fn test_sdxl_input_keeps_explicit_seed() {
        let mut p = params(Mode::Txt2Img);
        p.seed = 1234;
        p.steps = 20;
        let input = build_sdxl_input(&p);
        assert_eq!(input["num_inference_steps"], 20);
        assert_eq!(input["seed"], 1234);
    }

    #[test]
    fn test_poll_cap_exhaustion_maps_to_timeout() {
        let err = map_replicate_error(ReplicateError::TimedOut { attempts: 60 });
        assert!(matches!(err, GenerationError::TimedOut(_)));

        let err = map_replicate_error(ReplicateError::Failed("NSFW content".to_string()));
        assert!(matches!(
            err,
            GenerationError::Upstream { service, .. } if service == "Replicate"
        ));
    }

    #[test]
    fn test_parameters_json_mode_dependent_fields() {
        let txt = parameters_json(&params(Mode::Txt2Img), "webui");
        assert!(txt["denoising_strength"].is_null());

        let img = parameters_json(&params(Mode::Img2Img), "webui");
        assert_eq!(img["denoising_strength"], 0.75);
    }
}
