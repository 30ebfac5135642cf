use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Process-wide configuration, read once at startup and passed by reference
/// into each service constructor. Request-handling code never touches the
/// environment directly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_id: Option<String>,
    pub location: String,
    pub gemini_api_key: Option<String>,
    pub vision_api_key: Option<String>,
    pub tts_voice: String,
    pub tts_sample_rate: u32,
    pub port: u16,
    pub prompts_path: PathBuf,
}

impl AppConfig {
    /// Missing credentials are kept as `None` here and surface as an
    /// authentication error on the first call that needs them.
    pub fn from_env() -> Self {
        let project_id = env::var("GCP_PROJECT")
            .or_else(|_| env::var("GOOGLE_CLOUD_PROJECT"))
            .ok();
        let location = env::var("VERTEX_LOCATION").unwrap_or_else(|_| "us-central1".to_string());
        let gemini_api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        let vision_api_key = env::var("GOOGLE_VISION_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| gemini_api_key.clone());
        let tts_voice = env::var("TTS_VOICE").unwrap_or_else(|_| "Kore".to_string());
        let tts_sample_rate = env::var("TTS_SAMPLE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24_000);
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let prompts_path = env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_prompts_path());

        Self {
            project_id,
            location,
            gemini_api_key,
            vision_api_key,
            tts_voice,
            tts_sample_rate,
            port,
            prompts_path,
        }
    }
}

fn default_prompts_path() -> PathBuf {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        PathBuf::from(format!("{}/../config/prompts.yaml", manifest_dir))
    } else {
        PathBuf::from("config/prompts.yaml")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    pub prompts: PromptTemplates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplates {
    /// Grounding template with `{labels_text}`, `{objects_text}` and `{ocr}`
    /// placeholders, appended to the narration prompt when vision results
    /// are available.
    pub image_description: String,
}

const FALLBACK_TEMPLATE: &str = "Known facts about the scene: labels: {labels_text}; \
objects: {objects_text}; visible text: {ocr}.";

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompts: PromptTemplates {
                image_description: FALLBACK_TEMPLATE.to_string(),
            },
        }
    }
}

impl PromptConfig {
    /// Load templates from the YAML file, falling back to the compiled-in
    /// template when the file is missing or unparseable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}; using built-in prompt template",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read {}: {}; using built-in prompt template",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}
