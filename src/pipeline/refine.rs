use serde_json::json;
use tracing::{debug, info};

use crate::config::{
    Config, NO_ADVANCED_INSTRUCTIONS, REFERENCE_IMAGES_RULE, REFINE_PROMPT_TEMPLATE,
};
use crate::error::{classify_api_error, ModelFailure, Result, StudioError};
use crate::lighting::LightingSelection;
use crate::llm::gemini::GeminiTransport;
use crate::utils::timing::log_llm_timing;

/// Expands the structured choices into the instruction block sent to the text model.
pub fn build_refine_instruction(
    scene_description: &str,
    lighting: &LightingSelection,
    has_reference_images: bool,
) -> String {
    let advanced = lighting.advanced_lighting_instructions.trim();
    let advanced = if advanced.is_empty() {
        NO_ADVANCED_INSTRUCTIONS
    } else {
        advanced
    };
    let reference_rules = if has_reference_images {
        REFERENCE_IMAGES_RULE
    } else {
        ""
    };

    REFINE_PROMPT_TEMPLATE
        .replace("{reference_rules}", reference_rules)
        .replace("{lighting_clause}", lighting.lighting_type.clause())
        .replace("{temperature_clause}", lighting.color_temperature.clause())
        .replace("{exposure_clause}", lighting.exposure_compensation.clause())
        .replace("{contrast_clause}", lighting.contrast_enhancement.clause())
        .replace("{advanced_instructions}", advanced)
        .replace("{scene_description}", scene_description.trim())
}

/// Compiles description and lighting into the single brief used by the image model.
pub async fn refine_prompt<T: GeminiTransport>(
    transport: &T,
    config: &Config,
    scene_description: &str,
    lighting: &LightingSelection,
    has_reference_images: bool,
) -> Result<String> {
    let instruction = build_refine_instruction(scene_description, lighting, has_reference_images);
    let request = json!({
        "contents": [{ "role": "user", "parts": [{ "text": instruction }] }],
    });

    let model = config.gemini_text_model.as_str();
    let metadata = json!({
        "lightingType": lighting.lighting_type,
        "referenceImages": has_reference_images,
    });
    let response = log_llm_timing("gemini", model, "refine_prompt", Some(metadata), || {
        transport.generate_content(model, request)
    })
    .await
    .map_err(|err| classify_api_error(err, |err| StudioError::RefineFailed(err.into())))?;

    let refined = response.text().trim().to_string();
    if refined.is_empty() {
        let reason = response
            .block_reason()
            .unwrap_or_else(|| "the model returned an empty prompt".to_string());
        return Err(StudioError::RefineFailed(ModelFailure::EmptyReply(reason)));
    }

    info!(chars = refined.chars().count(), "Refined prompt received");
    debug!(prompt = %refined, "Refined prompt");
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::{
        ColorTemperature, ContrastEnhancement, ExposureCompensation, LightingType,
    };
    use crate::llm::gemini::GeminiApiError;
    use crate::pipeline::testing::{api_error, text_response, ScriptedTransport};

    fn night_selection() -> LightingSelection {
        LightingSelection {
            lighting_type: LightingType::Night,
            advanced_lighting_instructions: "  Velas encendidas en la mesa  ".to_string(),
            color_temperature: ColorTemperature::Golden,
            exposure_compensation: ExposureCompensation::VeryDark,
            contrast_enhancement: ContrastEnhancement::HighContrast,
        }
    }

    #[test]
    fn instruction_contains_every_clause_and_the_description() {
        let selection = night_selection();
        let text = build_refine_instruction("Suelo: mármol. Mesa: ausente.", &selection, false);

        assert!(text.contains(LightingType::Night.clause()));
        assert!(text.contains(ColorTemperature::Golden.clause()));
        assert!(text.contains(ExposureCompensation::VeryDark.clause()));
        assert!(text.contains(ContrastEnhancement::HighContrast.clause()));
        assert!(text.contains("Velas encendidas en la mesa"));
        assert!(text.contains("Suelo: mármol. Mesa: ausente."));
        assert!(text.contains("CAMERA LOCK"));
        assert!(text.contains("EMPTY REGIONS"));
        assert!(!text.contains("REFERENCE IMAGES"));
        assert!(!text.contains('{'), "unfilled placeholder in {text}");
    }

    #[test]
    fn reference_rule_and_empty_advanced_text() {
        let selection = LightingSelection::default();
        let text = build_refine_instruction("Pared: ladrillo.", &selection, true);
        assert!(text.contains("REFERENCE IMAGES"));
        assert!(text.contains("Additional lighting instructions from the user: none"));
    }

    #[test]
    fn description_braces_are_left_alone() {
        let selection = LightingSelection::default();
        let text = build_refine_instruction("Cartel: {lighting_clause}", &selection, false);
        assert!(text.contains("Cartel: {lighting_clause}"));
    }

    #[tokio::test]
    async fn returns_trimmed_model_text() {
        let transport = ScriptedTransport::new(vec![text_response("  A night render brief.  ")]);
        let refined = refine_prompt(
            &transport,
            &Config::for_tests(),
            "Suelo: mármol.",
            &night_selection(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(refined, "A night render brief.");

        let calls = transport.calls();
        assert_eq!(calls[0].0, "text-model");
        let sent = calls[0].1["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(sent.contains("Suelo: mármol."));
    }

    #[tokio::test]
    async fn failures_are_classified() {
        let transport = ScriptedTransport::new(vec![
            api_error(404, "Requested entity was not found."),
            api_error(400, "Bad prompt"),
            text_response("   "),
        ]);
        let config = Config::for_tests();
        let selection = LightingSelection::default();

        let first = refine_prompt(&transport, &config, "x", &selection, false).await;
        assert!(matches!(first, Err(StudioError::InvalidApiKey)));

        let second = refine_prompt(&transport, &config, "x", &selection, false).await;
        let second = second.unwrap_err();
        assert!(matches!(
            second.api_cause(),
            Some(GeminiApiError::Status { status: 400, .. })
        ));
        assert!(second.to_string().contains("Bad prompt"));

        let third = refine_prompt(&transport, &config, "x", &selection, false).await;
        assert!(matches!(
            third,
            Err(StudioError::RefineFailed(ModelFailure::EmptyReply(_)))
        ));
    }
}
