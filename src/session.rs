//! Interactive session: one `Studio` kept across commands read from stdin.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::cli::LightingArgs;
use crate::config::Config;
use crate::error::{Result, StudioError};
use crate::llm::gemini::GeminiTransport;
use crate::llm::GeminiClient;
use crate::state::{KeyStatus, Studio};
use crate::utils::http::build_http_client;
use crate::utils::timing::{complete_command_timer, start_command_timer};

#[derive(Debug, Parser)]
#[command(
    name = "session",
    no_binary_name = true,
    disable_version_flag = true,
    help_template = "{subcommands}"
)]
struct SessionLine {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Open a scene capture; drops the old description and render.
    Scene { path: PathBuf },
    /// Add a material or mood reference image.
    Reference { path: PathBuf },
    /// Detect the scene description with the vision model.
    Describe,
    /// Replace the description with your own text.
    Description {
        #[arg(
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        text: Vec<String>,
    },
    /// Change the lighting choices.
    Light(LightingArgs),
    /// Load a lighting file (defaults to LIGHTING_CONFIG_PATH).
    LoadLighting { path: Option<PathBuf> },
    /// Save the lighting choices (defaults to LIGHTING_CONFIG_PATH).
    SaveLighting { path: Option<PathBuf> },
    /// Refine the prompt and render the scene.
    Generate,
    /// Write the last render (defaults to RENDER_OUTPUT_PATH).
    Save { path: Option<PathBuf> },
    /// Start over with a new scene, keeping the lighting.
    New,
    /// Select an API key; without a value the configured key is selected again.
    Key { key: Option<String> },
    /// Show the session state.
    Status,
    /// Leave the session.
    #[command(alias = "exit")]
    Quit,
}

impl SessionCommand {
    pub fn parse_line(line: &str) -> std::result::Result<Option<Self>, clap::Error> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Ok(None);
        }
        SessionLine::try_parse_from(words).map(|parsed| Some(parsed.command))
    }

    fn name(&self) -> &'static str {
        match self {
            SessionCommand::Scene { .. } => "session.scene",
            SessionCommand::Reference { .. } => "session.reference",
            SessionCommand::Describe => "session.describe",
            SessionCommand::Description { .. } => "session.description",
            SessionCommand::Light(_) => "session.light",
            SessionCommand::LoadLighting { .. } => "session.load_lighting",
            SessionCommand::SaveLighting { .. } => "session.save_lighting",
            SessionCommand::Generate => "session.generate",
            SessionCommand::Save { .. } => "session.save",
            SessionCommand::New => "session.new",
            SessionCommand::Key { .. } => "session.key",
            SessionCommand::Status => "session.status",
            SessionCommand::Quit => "session.quit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn status_lines(studio: &Studio) -> Vec<String> {
    let scene = studio
        .scene_image()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(ninguna)".to_string());
    let description = match studio.description().trim() {
        "" => "(sin descripción)".to_string(),
        text => text.to_string(),
    };
    let key = match studio.key_status() {
        KeyStatus::Selected => "seleccionada",
        KeyStatus::Unselected => "sin seleccionar",
    };
    let render = match studio.result() {
        None => "(ninguno)".to_string(),
        Some(result) if result.is_success() => "listo para guardar".to_string(),
        Some(result) => result.error.clone().unwrap_or_default(),
    };
    let lighting = studio.lighting();
    vec![
        format!("Estado: {}", studio.phase().label()),
        format!("Clave de API: {key}"),
        format!("Escena: {scene}"),
        format!("Referencias: {}", studio.reference_images().len()),
        format!("Descripción: {description}"),
        format!(
            "Iluminación: {:?} / {:?} / {:?} / {:?}",
            lighting.lighting_type,
            lighting.color_temperature,
            lighting.exposure_compensation,
            lighting.contrast_enhancement
        ),
        format!("Render: {render}"),
    ]
}

/// Runs one command against the session. Output lines go through `emit`.
pub async fn execute<T: GeminiTransport>(
    studio: &mut Studio,
    command: SessionCommand,
    transport: &T,
    config: &Config,
    emit: &mut dyn FnMut(&str),
) -> Result<Flow> {
    match command {
        SessionCommand::Scene { path } => {
            emit(&format!("Escena: {}", path.display()));
            studio.set_scene_image(path);
        }
        SessionCommand::Reference { path } => {
            studio.add_reference_image(path);
            emit(&format!(
                "Imágenes de referencia: {}",
                studio.reference_images().len()
            ));
        }
        SessionCommand::Describe => {
            let description = studio.detect_description(transport, config).await?;
            emit(description);
        }
        SessionCommand::Description { text } => {
            studio.set_description(text.join(" "));
            emit("Descripción actualizada.");
        }
        SessionCommand::Light(args) => {
            args.apply(studio.lighting_mut());
            emit(&studio.lighting().to_json()?);
        }
        SessionCommand::LoadLighting { path } => {
            let path = path.unwrap_or_else(|| config.lighting_config_path.clone());
            studio.load_lighting(&path).await?;
            emit(&studio.lighting().to_json()?);
        }
        SessionCommand::SaveLighting { path } => {
            let path = path.unwrap_or_else(|| config.lighting_config_path.clone());
            studio.save_lighting(&path).await?;
            emit(&format!("Iluminación guardada en {}", path.display()));
        }
        SessionCommand::Generate => {
            let result = studio
                .generate(transport, config, |message: &str| emit(message))
                .await;
            match &result.error {
                None => emit("Render listo. Usa `save` para descargarlo."),
                Some(message) => emit(message),
            }
        }
        SessionCommand::Save { path } => {
            let path = path.unwrap_or_else(|| config.render_output_path.clone());
            let written = studio.save_render(&path).await?;
            emit(&format!("{} ({written} bytes)", path.display()));
        }
        SessionCommand::New => {
            studio.new_scene();
            emit("Nueva escena. La iluminación se conserva.");
        }
        SessionCommand::Key { .. } => {
            if !config.has_api_key() {
                return Err(StudioError::MissingApiKey);
            }
            studio.select_key();
            emit("Clave de API seleccionada.");
        }
        SessionCommand::Status => {
            for line in status_lines(studio) {
                emit(&line);
            }
        }
        SessionCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run_session(config: &Config) -> anyhow::Result<()> {
    let mut config = config.clone();
    let http = build_http_client(&config).context("Failed to build HTTP client")?;
    let mut client = GeminiClient::new(http.clone(), &config);
    let mut studio = Studio::new(config.has_api_key());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Sesión iniciada. Escribe `help` para ver los comandos.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match SessionCommand::parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        if let SessionCommand::Key { key: Some(key) } = &command {
            config.gemini_api_key = key.trim().to_string();
            client = GeminiClient::new(http.clone(), &config);
        }

        let mut timer = start_command_timer(command.name());
        let outcome = execute(&mut studio, command, &client, &config, &mut |text: &str| {
            println!("{text}")
        })
        .await;
        match outcome {
            Ok(flow) => {
                complete_command_timer(&mut timer, "success", None);
                if flow == Flow::Quit {
                    break;
                }
            }
            Err(err) => {
                error!("Session command failed: {err}");
                eprintln!("{err}");
                complete_command_timer(&mut timer, "error", Some(err.to_string()));
            }
        }
    }
    info!("Session closed");
    Ok(())
}
