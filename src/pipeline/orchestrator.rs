use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::config::{Config, BILLING_DOCS_URL, STRICT_LOCK_SUFFIX};
use crate::error::{Result, StudioError};
use crate::lighting::LightingSelection;
use crate::llm::gemini::GeminiTransport;
use crate::pipeline::{refine_prompt, render_scene};

pub const PROGRESS_REFINING: &str =
    "Paso 1/2: refinando el prompt con la descripción y la iluminación...";
pub const PROGRESS_GENERATING: &str = "Paso 2/2: generando el render fotorrealista...";

/// Outcome of one render attempt. Exactly one of `url` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderResult {
    pub url: Option<String>,
    pub error: Option<String>,
    #[serde(skip)]
    key_rejected: bool,
}

impl RenderResult {
    pub fn success(url: String) -> Self {
        Self {
            url: Some(url),
            error: None,
            key_rejected: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            url: None,
            error: Some(message.into()),
            key_rejected: false,
        }
    }

    pub fn from_error(err: &StudioError) -> Self {
        Self {
            key_rejected: err.is_invalid_api_key(),
            ..Self::failure(user_message(err))
        }
    }

    pub fn is_success(&self) -> bool {
        self.url.is_some()
    }

    /// The credential was refused and a new key must be selected.
    pub fn key_rejected(&self) -> bool {
        self.key_rejected
    }
}

/// User-facing text for a failed render.
pub fn user_message(err: &StudioError) -> String {
    if err.is_invalid_api_key() {
        format!(
            "{} Es posible que la clave haya caducado o que el proyecto no tenga la facturación habilitada. Selecciona de nuevo una clave de API válida. Más información: {}",
            StudioError::InvalidApiKey,
            BILLING_DOCS_URL
        )
    } else if err.is_upstream_internal_error() {
        "El servicio de generación devolvió un error interno (500). Prueba a simplificar la descripción o las instrucciones de iluminación, usa menos imágenes de referencia o imágenes más pequeñas, y vuelve a intentarlo en unos minutos.".to_string()
    } else {
        match err {
            StudioError::MissingDescription
            | StudioError::MissingSceneImage
            | StudioError::MissingApiKey
            | StudioError::Busy(_) => err.to_string(),
            _ => format!("Error al generar la imagen: {err}"),
        }
    }
}

async fn run_pipeline<T, F>(
    transport: &T,
    config: &Config,
    scene_image: &Path,
    scene_description: &str,
    reference_images: &[PathBuf],
    lighting: &LightingSelection,
    on_progress: &mut F,
) -> Result<String>
where
    T: GeminiTransport,
    F: FnMut(&str),
{
    on_progress(PROGRESS_REFINING);
    let mut prompt = refine_prompt(
        transport,
        config,
        scene_description,
        lighting,
        !reference_images.is_empty(),
    )
    .await?;
    if config.strict_lock_suffix {
        prompt.push_str(STRICT_LOCK_SUFFIX);
    }

    on_progress(PROGRESS_GENERATING);
    render_scene(transport, config, scene_image, &prompt, reference_images).await
}

/// Refines the prompt and renders the scene. Never fails; errors land in the result.
pub async fn generate<T, F>(
    transport: &T,
    config: &Config,
    scene_image: &Path,
    scene_description: &str,
    reference_images: &[PathBuf],
    lighting: &LightingSelection,
    mut on_progress: F,
) -> RenderResult
where
    T: GeminiTransport,
    F: FnMut(&str),
{
    if scene_description.trim().is_empty() {
        return RenderResult::from_error(&StudioError::MissingDescription);
    }

    info!(
        scene = %scene_image.display(),
        references = reference_images.len(),
        lighting = ?lighting.lighting_type,
        "Starting render"
    );
    match run_pipeline(
        transport,
        config,
        scene_image,
        scene_description,
        reference_images,
        lighting,
        &mut on_progress,
    )
    .await
    {
        Ok(url) => RenderResult::success(url),
        Err(err) => {
            error!(error = ?err, "Render pipeline failed: {err}");
            RenderResult::from_error(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::{
        ColorTemperature, ContrastEnhancement, ExposureCompensation, LightingType,
    };
    use crate::pipeline::testing::{
        api_error, image_response, text_response, write_png, ScriptedTransport,
    };

    fn night_golden() -> LightingSelection {
        LightingSelection {
            lighting_type: LightingType::Night,
            advanced_lighting_instructions: String::new(),
            color_temperature: ColorTemperature::Golden,
            exposure_compensation: ExposureCompensation::VeryDark,
            contrast_enhancement: ContrastEnhancement::HighContrast,
        }
    }

    #[tokio::test]
    async fn blank_description_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport = ScriptedTransport::default();
        let mut progress = Vec::new();

        let result = generate(
            &transport,
            &Config::for_tests(),
            &scene,
            "  \n\t ",
            &[],
            &night_golden(),
            |message: &str| progress.push(message.to_string()),
        )
        .await;

        assert!(result.url.is_none());
        assert!(!result.error.as_deref().unwrap_or_default().is_empty());
        assert_eq!(transport.call_count(), 0);
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_night_render() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport = ScriptedTransport::new(vec![
            text_response("Golden night brief."),
            image_response("image/png", "UkVOREVS"),
        ]);
        let mut progress = Vec::new();

        let result = generate(
            &transport,
            &Config::for_tests(),
            &scene,
            "Suelo: mármol. Mesa: ausente.",
            &[],
            &night_golden(),
            |message: &str| progress.push(message.to_string()),
        )
        .await;

        assert_eq!(progress.len(), 2);
        assert!(progress[0].contains("refinando"));
        assert!(progress[1].contains("generando"));
        assert!(result.url.is_some() != result.error.is_some());
        assert_eq!(result.url.as_deref(), Some("data:image/png;base64,UkVOREVS"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        let refine_text = calls[0].1["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(refine_text.contains("Suelo: mármol. Mesa: ausente."));
        assert!(refine_text.contains(LightingType::Night.clause()));
        let render_parts = calls[1].1["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(render_parts.len(), 2);
        let render_prompt = render_parts[1]["text"].as_str().unwrap();
        assert!(render_prompt.starts_with("Golden night brief."));
        assert!(render_prompt.ends_with(STRICT_LOCK_SUFFIX));
    }

    #[tokio::test]
    async fn suffix_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport = ScriptedTransport::new(vec![
            text_response("Plain brief."),
            image_response("image/png", "QQ=="),
        ]);
        let mut config = Config::for_tests();
        config.strict_lock_suffix = false;

        let result = generate(
            &transport,
            &config,
            &scene,
            "Pared: vacía.",
            &[],
            &LightingSelection::default(),
            |_: &str| {},
        )
        .await;
        assert!(result.is_success());
        let calls = transport.calls();
        assert_eq!(calls[1].1["contents"][0]["parts"][1]["text"], "Plain brief.");
    }

    #[tokio::test]
    async fn rejected_key_points_to_billing_docs() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport =
            ScriptedTransport::new(vec![api_error(404, "Requested entity was not found.")]);

        let result = generate(
            &transport,
            &Config::for_tests(),
            &scene,
            "Suelo: mármol.",
            &[],
            &LightingSelection::default(),
            |_: &str| {},
        )
        .await;

        let error = result.error.as_deref().unwrap();
        assert!(error.contains(BILLING_DOCS_URL));
        assert!(result.key_rejected());
        assert!(result.url.is_none());
    }

    #[tokio::test]
    async fn internal_errors_suggest_simplifying() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport = ScriptedTransport::new(vec![
            text_response("brief"),
            api_error(500, "Internal error encountered."),
        ]);

        let result = generate(
            &transport,
            &Config::for_tests(),
            &scene,
            "Suelo: mármol.",
            &[],
            &LightingSelection::default(),
            |_: &str| {},
        )
        .await;

        let error = result.error.unwrap();
        assert!(error.contains("simplificar"));
        assert!(!result.key_rejected);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn internal_errors_get_the_same_advice_from_either_step() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let refine_failure = ScriptedTransport::new(vec![api_error(500, "Backend failure")]);
        let render_failure = ScriptedTransport::new(vec![
            text_response("brief"),
            api_error(500, "Backend failure"),
        ]);

        let mut messages = Vec::new();
        for transport in [&refine_failure, &render_failure] {
            let result = generate(
                transport,
                &Config::for_tests(),
                &scene,
                "Suelo: mármol.",
                &[],
                &LightingSelection::default(),
                |_: &str| {},
            )
            .await;
            messages.push(result.error.unwrap());
        }

        assert_eq!(refine_failure.call_count(), 1);
        assert_eq!(render_failure.call_count(), 2);
        assert!(messages[0].contains("simplificar"), "{}", messages[0]);
        assert_eq!(messages[0], messages[1]);
    }

    #[tokio::test]
    async fn missing_image_part_is_reported_generically() {
        let dir = tempfile::tempdir().unwrap();
        let scene = write_png(dir.path(), "scene.png");
        let transport = ScriptedTransport::new(vec![
            text_response("brief"),
            text_response("blocked by policy"),
        ]);

        let result = generate(
            &transport,
            &Config::for_tests(),
            &scene,
            "Suelo: mármol.",
            &[],
            &LightingSelection::default(),
            |_: &str| {},
        )
        .await;

        let error = result.error.unwrap();
        assert!(error.starts_with("Error al generar la imagen"));
        assert!(error.contains("blocked by policy"));
    }

    #[test]
    fn result_serializes_without_internal_flags() {
        let value = serde_json::to_value(RenderResult::failure("fallo")).unwrap();
        assert_eq!(value, serde_json::json!({ "url": null, "error": "fallo" }));
    }
}
