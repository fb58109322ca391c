use axum::{
    Json,
    extract::{Multipart, State},
    http::HeaderMap,
};
use std::str::FromStr;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, GenerateResponse, auth};
use crate::services::{GenerateParams, Mode};

/// Multipart form fields with the same defaults the web client relies on.
struct GenerateForm {
    prompt: String,
    negative_prompt: String,
    steps: u32,
    cfg_scale: f64,
    width: u32,
    height: u32,
    sampler_name: Option<String>,
    seed: i64,
    batch_size: u32,
    n_iter: u32,
    mode: String,
    denoising_strength: f64,
    init_image: Option<Vec<u8>>,
}

impl GenerateForm {
    fn empty() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            steps: 30,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            sampler_name: None,
            seed: -1,
            batch_size: 1,
            n_iter: 1,
            mode: "txt2img".to_string(),
            denoising_strength: 0.75,
            init_image: None,
        }
    }
}

fn parse_field<T: FromStr>(name: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("Invalid value for {name}: {value}")))
}

async fn read_form(mut multipart: Multipart) -> Result<GenerateForm, ApiError> {
    let mut form = GenerateForm::empty();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };

        if name == "init_image" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("Failed to read init_image: {e}")))?;
            if !bytes.is_empty() {
                form.init_image = Some(bytes.to_vec());
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read field {name}: {e}")))?;

        match name.as_str() {
            "prompt" => form.prompt = value,
            "negative_prompt" => form.negative_prompt = value,
            "steps" => form.steps = parse_field(&name, &value)?,
            "cfg_scale" => form.cfg_scale = parse_field(&name, &value)?,
            "width" => form.width = parse_field(&name, &value)?,
            "height" => form.height = parse_field(&name, &value)?,
            "sampler_name" => form.sampler_name = Some(value),
            "seed" => form.seed = parse_field(&name, &value)?,
            "batch_size" => form.batch_size = parse_field(&name, &value)?,
            "n_iter" => form.n_iter = parse_field(&name, &value)?,
            "mode" => form.mode = value,
            "denoising_strength" => form.denoising_strength = parse_field(&name, &value)?,
            _ => {}
        }
    }

    Ok(form)
}

/// POST /api/generate
/// Works for anonymous callers too; history is only recorded for
/// authenticated ones.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ApiResponse<GenerateResponse>>, ApiError> {
    let form = read_form(multipart).await?;

    let mode = Mode::parse(&form.mode)
        .ok_or_else(|| ApiError::validation(format!("Unknown mode: {}", form.mode)))?;

    let sampler_name = match form.sampler_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => state.config().read().await.webui.default_sampler.clone(),
    };

    let params = GenerateParams {
        prompt: form.prompt,
        negative_prompt: form.negative_prompt,
        steps: form.steps,
        cfg_scale: form.cfg_scale,
        width: form.width,
        height: form.height,
        sampler_name,
        seed: form.seed,
        batch_size: form.batch_size,
        n_iter: form.n_iter,
        mode,
        denoising_strength: form.denoising_strength,
    };

    let user = auth::authenticate_optional(&state, &headers).await;

    let generated = state
        .generation_service()
        .generate(params, form.init_image, user.as_ref())
        .await?;

    Ok(Json(ApiResponse::success(GenerateResponse {
        message: "Image generated successfully".to_string(),
        image: generated.image,
        file: generated.file,
    })))
}
