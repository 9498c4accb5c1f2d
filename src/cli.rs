use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::lighting::{
    ColorTemperature, ContrastEnhancement, ExposureCompensation, LightingSelection, LightingType,
};

#[derive(Parser)]
#[command(
    name = "sketch-render-studio",
    version,
    about = "Turn 3D scene captures into photorealistic renders with Gemini"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ask the vision model for a literal description of a scene capture.
    Describe {
        image: PathBuf,
        /// Also write the description to this file.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Refine the prompt and render the scene photorealistically.
    Render(RenderArgs),
    /// Manage lighting_config.json files.
    Lighting {
        #[command(subcommand)]
        action: LightingAction,
    },
    /// Keep one scene open and work on it command by command.
    Session,
}

#[derive(Args)]
pub struct RenderArgs {
    pub image: PathBuf,
    /// Scene description; detected automatically when neither this nor --description-file is set.
    #[arg(long, conflicts_with = "description_file")]
    pub description: Option<String>,
    #[arg(long)]
    pub description_file: Option<PathBuf>,
    /// Extra reference images (materials, mood). May be repeated.
    #[arg(long = "reference", short = 'r')]
    pub references: Vec<PathBuf>,
    /// Lighting file to start from; must be valid. Defaults to LIGHTING_CONFIG_PATH when it exists.
    #[arg(long)]
    pub lighting_config: Option<PathBuf>,
    #[command(flatten)]
    pub lighting: LightingArgs,
    /// Where to write the render (defaults to RENDER_OUTPUT_PATH).
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Print the result as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LightingArgs {
    #[arg(long, value_enum)]
    pub lighting: Option<LightingType>,
    #[arg(long, value_enum)]
    pub color_temperature: Option<ColorTemperature>,
    #[arg(long, value_enum)]
    pub exposure: Option<ExposureCompensation>,
    #[arg(long, value_enum)]
    pub contrast: Option<ContrastEnhancement>,
    /// Free-text lighting instructions.
    #[arg(long)]
    pub advanced: Option<String>,
}

impl LightingArgs {
    pub fn apply(&self, selection: &mut LightingSelection) {
        if let Some(value) = self.lighting {
            selection.lighting_type = value;
        }
        if let Some(value) = self.color_temperature {
            selection.color_temperature = value;
        }
        if let Some(value) = self.exposure {
            selection.exposure_compensation = value;
        }
        if let Some(value) = self.contrast {
            selection.contrast_enhancement = value;
        }
        if let Some(value) = &self.advanced {
            selection.advanced_lighting_instructions = value.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum LightingAction {
    /// Write a lighting file from the given choices.
    Save {
        #[command(flatten)]
        lighting: LightingArgs,
        /// Start from an existing file instead of the defaults.
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Validate a lighting file and print it.
    Show { path: Option<PathBuf> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lighting_flags_only_override_what_is_given() {
        let cli = Cli::try_parse_from([
            "sketch-render-studio",
            "render",
            "scene.png",
            "--lighting",
            "night",
            "--exposure",
            "very_dark",
            "-r",
            "wood.jpg",
            "-r",
            "marble.jpg",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.references.len(), 2);

        let mut selection = LightingSelection {
            color_temperature: ColorTemperature::Golden,
            ..LightingSelection::default()
        };
        args.lighting.apply(&mut selection);
        assert_eq!(selection.lighting_type, LightingType::Night);
        assert_eq!(selection.exposure_compensation, ExposureCompensation::VeryDark);
        assert_eq!(selection.color_temperature, ColorTemperature::Golden);
    }

    #[test]
    fn unknown_lighting_values_are_refused() {
        let parsed = Cli::try_parse_from([
            "sketch-render-studio",
            "render",
            "scene.png",
            "--lighting",
            "dawn",
        ]);
        assert!(parsed.is_err());
    }
}
