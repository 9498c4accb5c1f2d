use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, StudioError};
use crate::lighting::LightingSelection;
use crate::llm::gemini::GeminiTransport;
use crate::llm::media::save_data_url;
use crate::pipeline::{describe_scene, generate, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Detecting,
    Generating,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "inactivo",
            Phase::Detecting => "detectando la escena",
            Phase::Generating => "generando el render",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Selected,
    Unselected,
}

/// Holds a phase for the duration of one action and returns to idle on drop.
struct PhaseGuard<'a> {
    phase: &'a mut Phase,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a mut Phase, next: Phase) -> Result<Self> {
        if *phase != Phase::Idle {
            return Err(StudioError::Busy(phase.label()));
        }
        *phase = next;
        Ok(Self { phase })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase = Phase::Idle;
    }
}

/// One editing session: the scene capture, its description, lighting and the last render.
#[derive(Debug)]
pub struct Studio {
    scene_image: Option<PathBuf>,
    description: String,
    reference_images: Vec<PathBuf>,
    lighting: LightingSelection,
    result: Option<RenderResult>,
    phase: Phase,
    key_status: KeyStatus,
}

impl Studio {
    pub fn new(key_available: bool) -> Self {
        Studio {
            scene_image: None,
            description: String::new(),
            reference_images: Vec::new(),
            lighting: LightingSelection::default(),
            result: None,
            phase: Phase::Idle,
            key_status: if key_available {
                KeyStatus::Selected
            } else {
                KeyStatus::Unselected
            },
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn key_status(&self) -> KeyStatus {
        self.key_status
    }

    pub fn select_key(&mut self) {
        self.key_status = KeyStatus::Selected;
    }

    /// Replaces the scene capture; its old description and render no longer apply.
    pub fn set_scene_image(&mut self, path: impl Into<PathBuf>) {
        self.scene_image = Some(path.into());
        self.description.clear();
        self.result = None;
    }

    pub fn scene_image(&self) -> Option<&Path> {
        self.scene_image.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn add_reference_image(&mut self, path: impl Into<PathBuf>) {
        self.reference_images.push(path.into());
    }

    pub fn reference_images(&self) -> &[PathBuf] {
        &self.reference_images
    }

    pub fn lighting(&self) -> &LightingSelection {
        &self.lighting
    }

    pub fn lighting_mut(&mut self) -> &mut LightingSelection {
        &mut self.lighting
    }

    pub fn result(&self) -> Option<&RenderResult> {
        self.result.as_ref()
    }

    /// Drops everything but the lighting choices.
    pub fn new_scene(&mut self) {
        self.scene_image = None;
        self.description.clear();
        self.reference_images.clear();
        self.result = None;
    }

    pub async fn save_lighting(&self, path: &Path) -> Result<()> {
        self.lighting.save_to(path).await
    }

    /// Replaces the lighting selection only when the whole file is valid.
    pub async fn load_lighting(&mut self, path: &Path) -> Result<()> {
        match LightingSelection::load_from(path).await {
            Ok(selection) => {
                self.lighting = selection;
                Ok(())
            }
            Err(err) => {
                warn!("Rejected lighting configuration {}: {err}", path.display());
                Err(err)
            }
        }
    }

    /// Loads the lighting for a render. A path the user named must be valid; the
    /// configured default is skipped when it is missing or invalid.
    pub async fn apply_lighting_file(
        &mut self,
        explicit: Option<&Path>,
        fallback: &Path,
    ) -> Result<()> {
        if let Some(path) = explicit {
            return self.load_lighting(path).await;
        }
        if !tokio::fs::try_exists(fallback).await.unwrap_or(false) {
            return Ok(());
        }
        if let Err(err) = self.load_lighting(fallback).await {
            info!("Keeping the current lighting instead of {}: {err}", fallback.display());
        }
        Ok(())
    }

    fn note_key_failure(&mut self, rejected: bool) {
        if rejected {
            warn!("API key rejected; a new key must be selected");
            self.key_status = KeyStatus::Unselected;
        }
    }

    pub async fn detect_description<T: GeminiTransport>(
        &mut self,
        transport: &T,
        config: &Config,
    ) -> Result<&str> {
        if self.key_status == KeyStatus::Unselected {
            return Err(StudioError::MissingApiKey);
        }
        let scene_image = self
            .scene_image
            .clone()
            .ok_or(StudioError::MissingSceneImage)?;

        let outcome = {
            let _busy = PhaseGuard::enter(&mut self.phase, Phase::Detecting)?;
            describe_scene(transport, config, &scene_image).await
        };

        match outcome {
            Ok(description) => {
                self.description = description;
                Ok(self.description.as_str())
            }
            Err(err) => {
                self.note_key_failure(err.is_invalid_api_key());
                Err(err)
            }
        }
    }

    pub async fn generate<T, F>(
        &mut self,
        transport: &T,
        config: &Config,
        on_progress: F,
    ) -> &RenderResult
    where
        T: GeminiTransport,
        F: FnMut(&str),
    {
        let result = self.run_generate(transport, config, on_progress).await;
        self.note_key_failure(result.key_rejected());
        self.result.insert(result)
    }

    async fn run_generate<T, F>(
        &mut self,
        transport: &T,
        config: &Config,
        on_progress: F,
    ) -> RenderResult
    where
        T: GeminiTransport,
        F: FnMut(&str),
    {
        let Some(scene_image) = self.scene_image.clone() else {
            return RenderResult::from_error(&StudioError::MissingSceneImage);
        };
        if self.key_status == KeyStatus::Unselected {
            return RenderResult::from_error(&StudioError::MissingApiKey);
        }

        let _busy = match PhaseGuard::enter(&mut self.phase, Phase::Generating) {
            Ok(guard) => guard,
            Err(err) => return RenderResult::from_error(&err),
        };
        generate(
            transport,
            config,
            &scene_image,
            &self.description,
            &self.reference_images,
            &self.lighting,
            on_progress,
        )
        .await
    }

    /// Writes the current render to disk.
    pub async fn save_render(&self, path: &Path) -> Result<usize> {
        let url = self
            .result
            .as_ref()
            .and_then(|result| result.url.as_deref())
            .ok_or(StudioError::NoRenderAvailable)?;
        let written = save_data_url(url, path).await?;
        info!("Saved render to {} ({} bytes)", path.display(), written);
        Ok(written)
    }
}
