use std::path::Path;

use serde_json::json;
use tracing::info;

use crate::config::{Config, DESCRIBE_SCENE_PROMPT};
use crate::error::{classify_api_error, ModelFailure, Result, StudioError};
use crate::llm::gemini::{build_safety_settings, GeminiTransport};
use crate::llm::media::encode_image_file;
use crate::utils::timing::log_llm_timing;

/// Asks the vision model for a literal inventory of the scene capture.
pub async fn describe_scene<T: GeminiTransport>(
    transport: &T,
    config: &Config,
    image: &Path,
) -> Result<String> {
    let payload = encode_image_file(image).await?;

    let request = json!({
        "contents": [{
            "role": "user",
            "parts": [payload.to_inline_part(), { "text": DESCRIBE_SCENE_PROMPT }]
        }],
        "safetySettings": build_safety_settings(&config.gemini_safety_settings),
    });

    let model = config.gemini_vision_model.as_str();
    let response = log_llm_timing("gemini", model, "describe_scene", None, || {
        transport.generate_content(model, request)
    })
    .await
    .map_err(|err| classify_api_error(err, |err| StudioError::DescribeFailed(err.into())))?;

    let description = response.text().trim().to_string();
    if description.is_empty() {
        let reason = response
            .block_reason()
            .unwrap_or_else(|| "the model returned no text".to_string());
        return Err(StudioError::DescribeFailed(ModelFailure::EmptyReply(reason)));
    }

    info!(chars = description.chars().count(), "Scene description received");
    Ok(description)
}
