use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, StudioError};

const FALLBACK_IMAGE_MIME: &str = "image/png";

/// Base64 image data plus its MIME type, as sent in an `inlineData` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Parses `data:<mime>;base64,<data>`, keeping only the trailing base64 segment.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| StudioError::InvalidDataUrl("missing data: prefix".to_string()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| StudioError::InvalidDataUrl("missing ',' separator".to_string()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| StudioError::InvalidDataUrl("payload is not base64".to_string()))?;
        if mime_type.is_empty() {
            return Err(StudioError::InvalidDataUrl("missing MIME type".to_string()));
        }

        Ok(Self {
            data: data.to_string(),
            mime_type: mime_type.to_string(),
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(self.data.trim())
            .map_err(|err| StudioError::InvalidDataUrl(err.to_string()))
    }

    pub fn to_inline_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": self.data
            }
        })
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

pub fn image_mime_for_bytes(bytes: &[u8]) -> String {
    match detect_mime_type(bytes) {
        Some(mime_type) if mime_type.starts_with("image/") => normalize_image_mime_type(&mime_type),
        Some(other) => {
            warn!(
                "File content looks like {}, sending it as {}",
                other, FALLBACK_IMAGE_MIME
            );
            FALLBACK_IMAGE_MIME.to_string()
        }
        None => FALLBACK_IMAGE_MIME.to_string(),
    }
}

/// Reads an image file fully into memory and encodes it for an inline part.
pub async fn encode_image_file(path: &Path) -> Result<ImagePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| StudioError::ReadImage {
            path: path.to_path_buf(),
            source,
        })?;
    let mime_type = image_mime_for_bytes(&bytes);
    debug!(
        path = %path.display(),
        mime_type = %mime_type,
        bytes = bytes.len(),
        "Encoded image file"
    );
    Ok(ImagePayload::from_bytes(&bytes, mime_type))
}

/// Encodes every file concurrently and returns the payloads in input order.
pub async fn encode_image_files(paths: &[PathBuf]) -> Result<Vec<ImagePayload>> {
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| tokio::spawn(async move { encode_image_file(&path).await }))
        .collect();

    let mut payloads = Vec::with_capacity(handles.len());
    for handle in handles {
        let payload = handle
            .await
            .map_err(|err| StudioError::Io(std::io::Error::other(err)))??;
        payloads.push(payload);
    }
    Ok(payloads)
}

/// Writes the image carried by a data URL to `path`.
pub async fn save_data_url(url: &str, path: &Path) -> Result<usize> {
    let bytes = ImagePayload::from_data_url(url)?.decode()?;
    tokio::fs::write(path, &bytes).await?;
    Ok(bytes.len())
}

#[cfg(test)]
pub(crate) const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];
