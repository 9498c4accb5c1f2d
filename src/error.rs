//! Error types for the describe / refine / render pipeline.

use std::path::PathBuf;

use crate::llm::gemini::GeminiApiError;

/// Upstream message returned when the key is unknown or lacks access to the model.
pub const ENTITY_NOT_FOUND_MESSAGE: &str = "Requested entity was not found.";

/// Upstream message attached to transient HTTP 500 responses.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error encountered";

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// The credential was rejected; the session must select a key again.
    #[error("La clave de API no es válida o no tiene acceso al modelo solicitado.")]
    InvalidApiKey,

    #[error("No hay ninguna clave de API configurada (GEMINI_API_KEY).")]
    MissingApiKey,

    #[error("Por favor, sube primero una imagen de la escena de SketchUp.")]
    MissingSceneImage,

    #[error("Por favor, primero detecta o escribe una descripción de la escena.")]
    MissingDescription,

    #[error("Ya hay una operación en curso ({0}); espera a que termine.")]
    Busy(&'static str),

    #[error("Todavía no hay ningún render para descargar.")]
    NoRenderAvailable,

    #[error("No se pudo leer la imagen {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data URL inválida: {0}")]
    InvalidDataUrl(String),

    #[error("No se pudo obtener la descripción de la escena: {0}")]
    DescribeFailed(#[source] ModelFailure),

    #[error("No se pudo refinar el prompt: {0}")]
    RefineFailed(#[source] ModelFailure),

    /// The render response carried no inline image; holds the model's text, if any.
    #[error("No se encontró ninguna imagen en la respuesta del modelo.{}", format_model_text(.0))]
    NoImageFound(Option<String>),

    #[error("Configuración de iluminación inválida o incompleta: {0}")]
    InvalidLightingConfig(String),

    #[error(transparent)]
    Api(#[from] GeminiApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a text-producing model step gave nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum ModelFailure {
    #[error(transparent)]
    Api(#[from] GeminiApiError),

    /// The call succeeded but carried no text; holds the block reason or a note.
    #[error("{0}")]
    EmptyReply(String),
}

fn format_model_text(text: &Option<String>) -> String {
    match text {
        Some(text) => format!(" Respuesta del modelo: {text}"),
        None => String::new(),
    }
}

/// Turns a transport failure into the pipeline's error, re-signalling rejected keys.
/// Every step goes through here so the key check cannot differ between them.
pub fn classify_api_error(
    err: GeminiApiError,
    wrap: impl FnOnce(GeminiApiError) -> StudioError,
) -> StudioError {
    if err.to_string().contains(ENTITY_NOT_FOUND_MESSAGE) {
        StudioError::InvalidApiKey
    } else {
        wrap(err)
    }
}

impl StudioError {
    pub fn is_invalid_api_key(&self) -> bool {
        match self {
            Self::InvalidApiKey => true,
            other => other.to_string().contains(ENTITY_NOT_FOUND_MESSAGE),
        }
    }

    /// The transport error behind this failure, whichever step raised it.
    pub fn api_cause(&self) -> Option<&GeminiApiError> {
        match self {
            Self::Api(err)
            | Self::DescribeFailed(ModelFailure::Api(err))
            | Self::RefineFailed(ModelFailure::Api(err)) => Some(err),
            _ => None,
        }
    }

    /// True for the transient upstream failure that is worth retrying by hand.
    pub fn is_upstream_internal_error(&self) -> bool {
        match self.api_cause() {
            Some(GeminiApiError::Status { status: 500, .. }) => true,
            _ => self.to_string().contains(INTERNAL_ERROR_MESSAGE),
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
