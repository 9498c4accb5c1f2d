use std::future::Future;

use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::ImagePayload;

#[derive(Debug, thiserror::Error)]
pub enum GeminiApiError {
    #[error("Gemini request failed: {0}")]
    Request(String),

    #[error("Gemini request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Gemini response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Option<Vec<GeminiCandidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiInlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub block_reason_message: Option<String>,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &GeminiPart> {
        self.candidates
            .iter()
            .flatten()
            .filter_map(|candidate| candidate.content.as_ref())
            .filter_map(|content| content.parts.as_ref())
            .flatten()
    }

    /// Non-empty text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts()
            .filter_map(|part| match part {
                GeminiPart::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The first part that carries inline binary data, in response order.
    pub fn first_inline_image(&self) -> Option<ImagePayload> {
        self.parts().find_map(|part| match part {
            GeminiPart::InlineData { inline_data } => Some(ImagePayload {
                data: inline_data.data.clone(),
                mime_type: inline_data.mime_type.clone(),
            }),
            _ => None,
        })
    }

    /// Why the model produced no content, when it says so.
    pub fn block_reason(&self) -> Option<String> {
        if let Some(feedback) = &self.prompt_feedback {
            if let Some(message) = &feedback.block_reason_message {
                return Some(message.clone());
            }
            if let Some(reason) = &feedback.block_reason {
                return Some(format!("Prompt blocked: {reason}"));
            }
        }
        self.candidates
            .iter()
            .flatten()
            .filter_map(|candidate| candidate.finish_reason.as_deref())
            .find(|reason| *reason != "STOP")
            .map(|reason| format!("Finish reason: {reason}"))
    }
}

/// Sends a `generateContent` payload to a model.
pub trait GeminiTransport {
    fn generate_content(
        &self,
        model: &str,
        payload: Value,
    ) -> impl Future<Output = Result<GeminiResponse, GeminiApiError>> + Send;
}

pub fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using standard thresholds.",
                profile
            );
            "BLOCK_MEDIUM_AND_ABOVE"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

pub fn build_image_generation_config(aspect_ratio: Option<&str>, include_text: bool) -> Value {
    let modalities = if include_text {
        json!(["IMAGE", "TEXT"])
    } else {
        json!(["IMAGE"])
    };
    let mut config = Map::new();
    config.insert("responseModalities".to_string(), modalities);

    if let Some(aspect_ratio) = aspect_ratio.map(str::trim).filter(|ratio| !ratio.is_empty()) {
        config.insert(
            "imageConfig".to_string(),
            json!({ "aspectRatio": aspect_ratio }),
        );
    }

    Value::Object(config)
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_part(part: &Value) -> Value {
    if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
        json!({ "text": truncate_for_log(text, 200) })
    } else if let Some(inline_data) = part.get("inlineData") {
        let mime_type = inline_data
            .get("mimeType")
            .and_then(|value| value.as_str())
            .unwrap_or("unknown");
        let data_len = inline_data
            .get("data")
            .and_then(|value| value.as_str())
            .map(str::len)
            .unwrap_or(0);
        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
    } else {
        json!({ "unknownPart": true })
    }
}

/// Payload with image data replaced by lengths, safe to log.
pub fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let contents = contents
            .iter()
            .map(|content| {
                let parts = content
                    .get("parts")
                    .and_then(|value| value.as_array())
                    .map(|parts| parts.iter().map(summarize_part).collect::<Vec<_>>())
                    .unwrap_or_default();
                json!({ "parts": parts })
            })
            .collect();
        summary.insert("contents".to_string(), Value::Array(contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

pub fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    for part in response.parts() {
        match part {
            GeminiPart::Text { text } => {
                text_parts += 1;
                if text_preview.is_none() && !text.trim().is_empty() {
                    text_preview = Some(truncate_for_log(text, 200));
                }
            }
            GeminiPart::InlineData { .. } => image_parts += 1,
            GeminiPart::Other(_) => {}
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(Vec::len).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview,
        "blockReason": response.block_reason(),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Gemini REST client backed by reqwest.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.gemini_api_key.trim().to_string(),
            base_url: config.gemini_api_base_url.clone(),
        }
    }

    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.api_key, "[redacted]")
    }

    async fn send(&self, model: &str, payload: Value) -> Result<GeminiResponse, GeminiApiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, payload = %summarize_payload(&payload));
        }

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                GeminiApiError::Request(err_text)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            return Err(GeminiApiError::Status {
                status: status.as_u16(),
                message: self.redact(&message.unwrap_or(body_summary)),
            });
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| GeminiApiError::Decode(self.redact(&err.to_string())))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, response = %summarize_response(&value));
        }
        Ok(value)
    }
}

impl GeminiTransport for GeminiClient {
    fn generate_content(
        &self,
        model: &str,
        payload: Value,
    ) -> impl Future<Output = Result<GeminiResponse, GeminiApiError>> + Send {
        self.send(model, payload)
    }
}
