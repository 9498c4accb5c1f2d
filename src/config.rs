use std::env;
use std::path::PathBuf;

use anyhow::Result;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_api_base_url: String,
    pub gemini_vision_model: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub gemini_image_aspect_ratio: String,
    pub gemini_image_text_output: bool,
    pub gemini_safety_settings: String,
    pub strict_lock_suffix: bool,
    pub http_timeout_seconds: u64,
    pub lighting_config_path: PathBuf,
    pub render_output_path: PathBuf,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_first_non_empty(names: &[&str]) -> String {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "standard" | "medium" => "standard".to_string(),
        "permissive" | "off" | "none" => "permissive".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn normalize_base_url(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_base_url = normalize_base_url(env_string(
            "GEMINI_API_BASE_URL",
            "https://generativelanguage.googleapis.com/v1beta",
        ));
        if gemini_api_base_url.is_empty() {
            return Err(anyhow::anyhow!("GEMINI_API_BASE_URL must not be empty"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            gemini_api_key: env_first_non_empty(&["GEMINI_API_KEY", "API_KEY", "GOOGLE_API_KEY"]),
            gemini_api_base_url,
            gemini_vision_model: env_string("GEMINI_VISION_MODEL", "gemini-2.5-flash"),
            gemini_text_model: env_string("GEMINI_TEXT_MODEL", "gemini-2.5-flash"),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            gemini_image_aspect_ratio: env_string("GEMINI_IMAGE_ASPECT_RATIO", "")
                .trim()
                .to_string(),
            gemini_image_text_output: env_bool("GEMINI_IMAGE_TEXT_OUTPUT", true),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            strict_lock_suffix: env_bool("STRICT_LOCK_SUFFIX", true),
            http_timeout_seconds: env_u64("HTTP_TIMEOUT_SECONDS", 0),
            lighting_config_path: PathBuf::from(env_string(
                "LIGHTING_CONFIG_PATH",
                "lighting_config.json",
            )),
            render_output_path: PathBuf::from(env_string("RENDER_OUTPUT_PATH", "event_render.png")),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            log_level: "debug".to_string(),
            log_dir: PathBuf::from("logs"),
            gemini_api_key: "test-key".to_string(),
            gemini_api_base_url: "http://127.0.0.1:9".to_string(),
            gemini_vision_model: "vision-model".to_string(),
            gemini_text_model: "text-model".to_string(),
            gemini_image_model: "image-model".to_string(),
            gemini_image_aspect_ratio: String::new(),
            gemini_image_text_output: true,
            gemini_safety_settings: "standard".to_string(),
            strict_lock_suffix: true,
            http_timeout_seconds: 0,
            lighting_config_path: PathBuf::from("lighting_config.json"),
            render_output_path: PathBuf::from("event_render.png"),
        }
    }
}

pub const BILLING_DOCS_URL: &str = "https://ai.google.dev/gemini-api/docs/billing";

pub const DESCRIBE_SCENE_PROMPT: &str = r#"Eres un inventariador técnico de escenas 3D. Recibes una captura de un modelo de SketchUp (o software similar) y debes describir ÚNICAMENTE lo que es visible.

REGLAS ESTRICTAS:
1. Describe solo elementos realmente visibles. NO inventes objetos, personas, decoración ni detalles que no aparezcan.
2. NO describas ni deduzcas la iluminación, la hora del día, las sombras ni el ambiente lumínico. La iluminación se definirá por separado.
3. Si una zona está vacía (suelo libre, pared lisa, fondo sin elementos), indícalo de forma explícita como "vacío" o "ausente".
4. Usa frases cortas y literales. Nada de adjetivos poéticos.

FORMATO DE SALIDA (en español, con estos encabezados):
ENCUADRE DE CÁMARA: tipo de plano, altura aproximada del punto de vista, orientación y qué queda en los bordes de la imagen.
ESPACIO: tipo de espacio (interior/exterior), dimensiones aparentes y elementos arquitectónicos (suelo, paredes, techo, huecos).
OBJETOS: lista con un elemento por línea en la forma "Elemento: posición, forma, material aparente".
MATERIALES: materiales visibles por superficie (por ejemplo "Suelo: mármol").
ZONAS VACÍAS: regiones sin elementos que deben seguir vacías.
"#;

pub const REFINE_PROMPT_TEMPLATE: &str = r#"You are a prompt engineer for a photorealistic architectural image model. Write ONE coherent natural-language brief (a single block of prose, no lists, no headings, no preamble) that instructs the image model to turn the attached 3D-software screenshot into a photorealistic photograph of exactly the same scene.

The brief MUST encode these non-negotiable rules:
- CAMERA LOCK: keep the exact camera position, focal length, framing, perspective and aspect ratio of the screenshot. Do not crop, zoom, rotate or extend the canvas.
- GEOMETRY LOCK: reproduce only the geometry present in the screenshot. Never add, remove, move or resize objects, walls, openings or furniture. Do not invent geometry.
- EMPTY REGIONS: every area described as empty or absent must remain empty in the render.
- MATERIALS: apply physically plausible, photorealistic treatment (textures, reflections, roughness, subtle imperfections) to the materials already present.
{reference_rules}
LIGHTING TO APPLY:
- Base lighting: {lighting_clause}
- Color temperature: {temperature_clause}
- Exposure: {exposure_clause}
- Contrast: {contrast_clause}
- Additional lighting instructions from the user: {advanced_instructions}

SCENE INVENTORY (literal description of the screenshot, authoritative for what exists and what is empty):
{scene_description}

Return ONLY the final brief text."#;

pub const REFERENCE_IMAGES_RULE: &str = "- REFERENCE IMAGES: additional reference photos follow the screenshot. Use them ONLY as guidance for material finish, color palette and mood. Never copy their geometry, objects, camera or composition.\n";

pub const NO_ADVANCED_INSTRUCTIONS: &str = "none";

pub const STRICT_LOCK_SUFFIX: &str = "\n\nSTRICT LOCK: The first attached image is the only authority for composition. Output must keep its exact aspect ratio, camera framing, perspective and geometry. Do not add, remove or move any element. Empty areas stay empty. Only lighting and material realism may change.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_profile_aliases_are_normalized() {
        assert_eq!(normalize_gemini_safety_settings("".to_string()), "standard");
        assert_eq!(normalize_gemini_safety_settings(" OFF ".to_string()), "permissive");
        assert_eq!(normalize_gemini_safety_settings("medium".to_string()), "standard");
        assert_eq!(normalize_gemini_safety_settings("strict?".to_string()), "standard");
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://example.test/v1beta/ ".to_string()),
            "https://example.test/v1beta"
        );
    }

    #[test]
    fn api_key_lookup_skips_blank_variables() {
        env::set_var("STUDIO_TEST_KEY_PRIMARY", "   ");
        env::set_var("STUDIO_TEST_KEY_FALLBACK", "fallback-key");
        let key = env_first_non_empty(&[
            "STUDIO_TEST_KEY_MISSING",
            "STUDIO_TEST_KEY_PRIMARY",
            "STUDIO_TEST_KEY_FALLBACK",
        ]);
        assert_eq!(key, "fallback-key");
    }

    #[test]
    fn refine_template_carries_every_placeholder() {
        for placeholder in [
            "{reference_rules}",
            "{lighting_clause}",
            "{temperature_clause}",
            "{exposure_clause}",
            "{contrast_clause}",
            "{advanced_instructions}",
            "{scene_description}",
        ] {
            assert!(
                REFINE_PROMPT_TEMPLATE.contains(placeholder),
                "missing {placeholder}"
            );
        }
    }
}
