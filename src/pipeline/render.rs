use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{classify_api_error, Result, StudioError};
use crate::llm::gemini::{build_image_generation_config, build_safety_settings, GeminiTransport};
use crate::llm::media::{encode_image_file, encode_image_files};
use crate::utils::timing::log_llm_timing;

const AUTO_ASPECT_RATIO: &str = "auto";

const SUPPORTED_ASPECT_RATIOS: &[(&str, f64)] = &[
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

/// Closest ratio the image model accepts, compared on a log scale.
pub fn nearest_aspect_ratio(width: u32, height: u32) -> Option<&'static str> {
    if width == 0 || height == 0 {
        return None;
    }
    let target = (width as f64 / height as f64).ln();
    SUPPORTED_ASPECT_RATIOS
        .iter()
        .min_by(|(_, a), (_, b)| {
            (a.ln() - target)
                .abs()
                .total_cmp(&(b.ln() - target).abs())
        })
        .map(|(label, _)| *label)
}

async fn resolve_aspect_ratio(config: &Config, scene_image: &Path) -> Option<String> {
    let configured = config.gemini_image_aspect_ratio.trim();
    if configured.is_empty() {
        return None;
    }
    if !configured.eq_ignore_ascii_case(AUTO_ASPECT_RATIO) {
        return Some(configured.to_string());
    }

    let path = scene_image.to_path_buf();
    match tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await {
        Ok(Ok((width, height))) => {
            let ratio = nearest_aspect_ratio(width, height);
            info!(width, height, ratio = ?ratio, "Matched scene aspect ratio");
            ratio.map(str::to_string)
        }
        Ok(Err(err)) => {
            warn!("Could not read scene dimensions, skipping aspect ratio: {err}");
            None
        }
        Err(err) => {
            warn!("Aspect ratio probe task failed: {err}");
            None
        }
    }
}

pub fn build_render_payload(
    config: &Config,
    scene_part: Value,
    reference_parts: Vec<Value>,
    prompt: &str,
    aspect_ratio: Option<&str>,
) -> Value {
    let mut parts = Vec::with_capacity(reference_parts.len() + 2);
    parts.push(scene_part);
    parts.extend(reference_parts);
    parts.push(json!({ "text": prompt }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": build_image_generation_config(
            aspect_ratio,
            config.gemini_image_text_output,
        ),
        "safetySettings": build_safety_settings(&config.gemini_safety_settings),
    })
}

/// Sends scene, references and prompt to the image model and returns the image as a data URL.
pub async fn render_scene<T: GeminiTransport>(
    transport: &T,
    config: &Config,
    scene_image: &Path,
    prompt: &str,
    reference_images: &[PathBuf],
) -> Result<String> {
    let scene = encode_image_file(scene_image).await?;
    let references = encode_image_files(reference_images).await?;
    let aspect_ratio = resolve_aspect_ratio(config, scene_image).await;

    let payload = build_render_payload(
        config,
        scene.to_inline_part(),
        references.iter().map(|image| image.to_inline_part()).collect(),
        prompt,
        aspect_ratio.as_deref(),
    );

    let model = config.gemini_image_model.as_str();
    let metadata = json!({
        "referenceImages": references.len(),
        "aspectRatio": aspect_ratio,
    });
    let response = log_llm_timing("gemini", model, "render_scene", Some(metadata), || {
        transport.generate_content(model, payload)
    })
    .await
    .map_err(|err| classify_api_error(err, StudioError::Api))?;

    match response.first_inline_image() {
        Some(image) => {
            info!(mime_type = %image.mime_type, bytes_b64 = image.data.len(), "Render received");
            Ok(image.to_data_url())
        }
        None => {
            let text = response.text();
            let detail = if text.trim().is_empty() {
                response.block_reason()
            } else {
                Some(text.trim().to_string())
            };
            warn!(detail = ?detail, "Render response carried no image");
            Err(StudioError::NoImageFound(detail))
        }
    }
}
