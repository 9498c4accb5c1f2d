use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod cli;
mod config;
mod error;
mod lighting;
mod llm;
mod pipeline;
mod session;
mod state;
mod utils;

use cli::{Cli, Command, LightingAction, RenderArgs};
use config::Config;
use lighting::LightingSelection;
use llm::GeminiClient;
use state::Studio;
use utils::http::build_http_client;
use utils::logging::init_logging;
use utils::timing::{complete_command_timer, start_command_timer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load()?;
    let _guards = init_logging(&config);

    match cli.command {
        Command::Describe { image, output } => run_describe(&config, image, output).await,
        Command::Render(args) => run_render(&config, args).await,
        Command::Lighting { action } => run_lighting(&config, action).await,
        Command::Session => session::run_session(&config).await,
    }
}

fn gemini_client(config: &Config) -> anyhow::Result<GeminiClient> {
    if !config.has_api_key() {
        return Err(anyhow!(error::StudioError::MissingApiKey));
    }
    let http = build_http_client(config).context("Failed to build HTTP client")?;
    Ok(GeminiClient::new(http, config))
}

async fn run_describe(
    config: &Config,
    image: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut timer = start_command_timer("describe");
    let client = gemini_client(config)?;
    let mut studio = Studio::new(config.has_api_key());
    studio.set_scene_image(image);

    let description = match studio.detect_description(&client, config).await {
        Ok(description) => description.to_string(),
        Err(err) => {
            error!("Scene description failed: {err}");
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            return Err(err.into());
        }
    };

    println!("{description}");
    if let Some(path) = output {
        tokio::fs::write(&path, &description)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Description written to {}", path.display());
    }
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

async fn run_render(config: &Config, args: RenderArgs) -> anyhow::Result<()> {
    let mut timer = start_command_timer("render");
    let client = gemini_client(config)?;
    let mut studio = Studio::new(config.has_api_key());
    studio.set_scene_image(args.image.clone());
    for reference in &args.references {
        studio.add_reference_image(reference.clone());
    }

    if let Err(err) = studio
        .apply_lighting_file(args.lighting_config.as_deref(), &config.lighting_config_path)
        .await
    {
        complete_command_timer(&mut timer, "error", Some(err.to_string()));
        return Err(err.into());
    }
    args.lighting.apply(studio.lighting_mut());

    let description = match (&args.description, &args.description_file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, None) => None,
    };
    match description {
        Some(text) => studio.set_description(text),
        None => {
            eprintln!("Detectando la escena...");
            let detected = studio.detect_description(&client, config).await?;
            eprintln!("{detected}\n");
        }
    }

    let result = studio
        .generate(&client, config, |message: &str| eprintln!("{message}"))
        .await
        .clone();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if let Some(message) = &result.error {
        if result.key_rejected() {
            warn!("API key rejected; set a valid GEMINI_API_KEY before retrying");
        }
        complete_command_timer(&mut timer, "error", Some(message.clone()));
        return Err(anyhow!(message.clone()));
    }

    let output = args
        .output
        .unwrap_or_else(|| config.render_output_path.clone());
    let written = studio.save_render(&output).await?;
    if !args.json {
        println!("{}", output.display());
    }
    complete_command_timer(
        &mut timer,
        "success",
        Some(format!("{} bytes -> {}", written, output.display())),
    );
    Ok(())
}

async fn run_lighting(config: &Config, action: LightingAction) -> anyhow::Result<()> {
    match action {
        LightingAction::Save {
            lighting,
            from,
            output,
        } => {
            let mut studio = Studio::new(config.has_api_key());
            if let Some(path) = from {
                studio.load_lighting(&path).await?;
            }
            lighting.apply(studio.lighting_mut());
            let output = output.unwrap_or_else(|| config.lighting_config_path.clone());
            studio.save_lighting(&output).await?;
            println!("{}", output.display());
        }
        LightingAction::Show { path } => {
            let path = path.unwrap_or_else(|| config.lighting_config_path.clone());
            let selection = LightingSelection::load_from(&path).await?;
            println!("{}", selection.to_json()?);
        }
    }
    Ok(())
}
