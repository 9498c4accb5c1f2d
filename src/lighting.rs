//! Lighting choices applied to the render and their `lighting_config.json` form.

use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StudioError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum LightingType {
    #[default]
    Day,
    Sunset,
    Night,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum ColorTemperature {
    Warm,
    #[default]
    Neutral,
    Cool,
    Golden,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ExposureCompensation {
    #[default]
    Standard,
    Brighter,
    Darker,
    VeryBright,
    VeryDark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ContrastEnhancement {
    #[default]
    Natural,
    Enhanced,
    Soft,
    HighContrast,
    LowContrast,
}

impl LightingType {
    pub fn clause(self) -> &'static str {
        match self {
            Self::Day => "bright natural daylight with the sun high in the sky, soft skylight filling the space through every opening and crisp, physically correct shadows",
            Self::Sunset => "golden-hour sunset light with a low sun raking across surfaces, long soft shadows and a warm glow on floors and walls facing the openings",
            Self::Night => "night-time scene with a dark sky outside, lit only by artificial sources (ceiling fixtures, lamps, accent and facade lights) with realistic falloff and pools of light",
        }
    }
}

impl ColorTemperature {
    pub fn clause(self) -> &'static str {
        match self {
            Self::Warm => "warm white light around 3000K, inviting and cozy",
            Self::Neutral => "neutral white light around 4000-4500K with faithful material colors",
            Self::Cool => "cool white light around 5500-6500K with a crisp, clean feel",
            Self::Golden => "golden amber tones around 2200-2700K, rich and luxurious",
        }
    }
}

impl ExposureCompensation {
    pub fn clause(self) -> &'static str {
        match self {
            Self::Standard => "balanced, correctly exposed image with detail in highlights and shadows",
            Self::Brighter => "slightly brighter exposure (about +0.5 to +1 EV) with open, airy shadows",
            Self::Darker => "slightly darker exposure (about -0.5 to -1 EV) for a moodier look",
            Self::VeryBright => "very bright, high-key exposure (about +1.5 to +2 EV) without clipping the highlights",
            Self::VeryDark => "very dark, low-key exposure (about -1.5 to -2 EV) while keeping the main surfaces readable",
        }
    }
}

impl ContrastEnhancement {
    pub fn clause(self) -> &'static str {
        match self {
            Self::Natural => "natural photographic contrast, as captured by a high-end camera",
            Self::Enhanced => "moderately enhanced contrast with punchier midtones and defined edges",
            Self::Soft => "soft contrast with gentle tonal transitions and diffused shadow edges",
            Self::HighContrast => "high contrast with deep blacks, bright highlights and dramatic separation",
            Self::LowContrast => "low contrast with lifted shadows and a flat, matte editorial look",
        }
    }
}

/// The user's lighting choices. Every key is required when loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingSelection {
    pub lighting_type: LightingType,
    pub advanced_lighting_instructions: String,
    pub color_temperature: ColorTemperature,
    pub exposure_compensation: ExposureCompensation,
    pub contrast_enhancement: ContrastEnhancement,
}

impl LightingSelection {
    /// Pretty JSON with two-space indentation.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| StudioError::InvalidLightingConfig(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|err| StudioError::InvalidLightingConfig(err.to_string()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        tokio::fs::write(path, json).await?;
        info!("Saved lighting configuration to {}", path.display());
        Ok(())
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let selection = Self::from_json(&raw)?;
        info!("Loaded lighting configuration from {}", path.display());
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn every_enum_value_has_a_clause() {
        for value in LightingType::value_variants() {
            assert!(!value.clause().trim().is_empty(), "{value:?}");
        }
        for value in ColorTemperature::value_variants() {
            assert!(!value.clause().trim().is_empty(), "{value:?}");
        }
        for value in ExposureCompensation::value_variants() {
            assert!(!value.clause().trim().is_empty(), "{value:?}");
        }
        for value in ContrastEnhancement::value_variants() {
            assert!(!value.clause().trim().is_empty(), "{value:?}");
        }
    }

    #[test]
    fn writes_the_documented_file_format() {
        let selection = LightingSelection {
            lighting_type: LightingType::Sunset,
            advanced_lighting_instructions: "Velas en la mesa".to_string(),
            color_temperature: ColorTemperature::Golden,
            exposure_compensation: ExposureCompensation::VeryBright,
            contrast_enhancement: ContrastEnhancement::LowContrast,
        };
        let text = selection.to_json().unwrap();
        assert!(text.contains("\n  \"lightingType\": \"sunset\""));

        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "lightingType": "sunset",
                "advancedLightingInstructions": "Velas en la mesa",
                "colorTemperature": "golden",
                "exposureCompensation": "very_bright",
                "contrastEnhancement": "low_contrast"
            })
        );
    }

    #[test]
    fn every_combination_loads_back_identically() {
        let texts = ["", "Luz cenital \"suave\"\nsin reflejos"];
        let mut checked = 0;
        for &lighting_type in LightingType::value_variants() {
            for &color_temperature in ColorTemperature::value_variants() {
                for &exposure_compensation in ExposureCompensation::value_variants() {
                    for &contrast_enhancement in ContrastEnhancement::value_variants() {
                        let selection = LightingSelection {
                            lighting_type,
                            advanced_lighting_instructions: texts[checked % texts.len()]
                                .to_string(),
                            color_temperature,
                            exposure_compensation,
                            contrast_enhancement,
                        };
                        let loaded =
                            LightingSelection::from_json(&selection.to_json().unwrap()).unwrap();
                        assert_eq!(loaded, selection);
                        checked += 1;
                    }
                }
            }
        }
        assert_eq!(checked, 3 * 4 * 5 * 5);
    }

    #[test]
    fn missing_any_key_is_rejected() {
        let complete = LightingSelection::default().to_json().unwrap();
        let complete: Value = serde_json::from_str(&complete).unwrap();
        for key in [
            "lightingType",
            "advancedLightingInstructions",
            "colorTemperature",
            "exposureCompensation",
            "contrastEnhancement",
        ] {
            let mut partial = complete.clone();
            partial.as_object_mut().unwrap().remove(key);
            let err = LightingSelection::from_json(&partial.to_string()).unwrap_err();
            assert!(
                matches!(err, StudioError::InvalidLightingConfig(_)),
                "{key} should be required"
            );
        }
    }

    #[test]
    fn unknown_values_and_null_text_are_rejected() {
        let bad_enum = r#"{"lightingType":"dawn","advancedLightingInstructions":"","colorTemperature":"warm","exposureCompensation":"standard","contrastEnhancement":"natural"}"#;
        assert!(LightingSelection::from_json(bad_enum).is_err());

        let null_text = r#"{"lightingType":"day","advancedLightingInstructions":null,"colorTemperature":"warm","exposureCompensation":"standard","contrastEnhancement":"natural"}"#;
        assert!(LightingSelection::from_json(null_text).is_err());
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lighting_config.json");
        let selection = LightingSelection {
            lighting_type: LightingType::Night,
            ..LightingSelection::default()
        };
        selection.save_to(&path).await.unwrap();
        assert_eq!(LightingSelection::load_from(&path).await.unwrap(), selection);
    }
}
