use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use reqwest::Client as HttpClient;
use serde_json::{Value, json};
use shared::VisionResult;
use std::path::Path;
use thiserror::Error;

use crate::config::{AppConfig, PromptConfig};
use crate::error::ApiError;
use crate::gemini::{self, GeminiError};

const MODEL: &str = "gemini-2.5-flash-lite";
const MAX_WIDTH: u32 = 640;
const MAX_HEIGHT: u32 = 480;
const JPEG_QUALITY: u8 = 75;
const MAX_NARRATION_CHARS: usize = 2000;

const NARRATION_PROMPT: &str = "\
You are acting as a visual aid for a blind person. The person is navigating \
their surroundings and cannot see, but you provide a complete understanding \
of what is happening around them.

1. Hazards first: begin by immediately mentioning any potential dangers or \
obstacles that could affect the person's movement or safety, such as stairs, \
curbs, vehicles, bicycles, moving objects, slippery surfaces or crosswalks. \
Use clear, concise instructions like \"watch out for stairs ahead\".

2. Scene description: after mentioning hazards, describe the rest of the \
surroundings as if the person could perceive it naturally: key objects and \
people, their relative positions (left, center, right), approximate \
distances or sizes, and notable environmental details. Skip irrelevant \
details that serve no purpose.

3. Format and style: keep the description short, actionable and easy to \
understand, in natural conversational language, as if narrating the scene \
to someone walking through it. Never say \"this is an image\" or \"the \
image shows\"; describe the scene as if it is happening in real life.";

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("cannot decode uploaded image: {0}")]
    InvalidImage(String),
    #[error("generative API returned no usable text")]
    EmptyNarration,
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Gemini(#[from] GeminiError),
}

impl From<CaptionError> for ApiError {
    fn from(e: CaptionError) -> Self {
        match e {
            CaptionError::InvalidImage(m) => ApiError::BadRequest(m),
            CaptionError::EmptyNarration => {
                ApiError::Protocol("generative API returned no usable text".into())
            }
            CaptionError::Io(m) => ApiError::Internal(m.to_string()),
            CaptionError::Gemini(inner) => inner.into(),
        }
    }
}

/// Produces a short narration of an image via the generative API,
/// optionally grounded in vision analysis results.
#[derive(Clone)]
pub struct CaptionService {
    client: HttpClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
    prompts: PromptConfig,
}

impl CaptionService {
    pub fn new(config: &AppConfig, prompts: PromptConfig) -> Self {
        Self {
            client: HttpClient::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: gemini::DEFAULT_BASE_URL.to_string(),
            model: MODEL.to_string(),
            prompts,
        }
    }

    pub async fn narrate_file(
        &self,
        path: &Path,
        vision: Option<&VisionResult>,
    ) -> Result<String, CaptionError> {
        let bytes = std::fs::read(path)?;
        self.narrate(&bytes, vision).await
    }

    /// Returns a non-empty narration, truncated to a bounded length.
    pub async fn narrate(
        &self,
        image: &[u8],
        vision: Option<&VisionResult>,
    ) -> Result<String, CaptionError> {
        let jpeg = resize_for_caption(image)?;
        let prompt = self.build_prompt(vision);

        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": STANDARD.encode(&jpeg) } },
                    { "text": prompt },
                ]
            }]
        });

        let response = gemini::generate_content(
            &self.client,
            &self.base_url,
            &self.model,
            self.api_key.as_deref(),
            &body,
        )
        .await?;

        narration_from_response(&response)
    }

    fn build_prompt(&self, vision: Option<&VisionResult>) -> String {
        let mut prompt = NARRATION_PROMPT.to_string();
        if let Some(vision) = vision {
            prompt.push_str("\n\n");
            prompt.push_str(&grounding_block(
                &self.prompts.prompts.image_description,
                vision,
            ));
        }
        prompt
    }
}

/// A response whose text parts trim down to nothing is a malformed
/// response, not an empty narration to pass along.
fn narration_from_response(response: &Value) -> Result<String, CaptionError> {
    let narration = gemini::collect_text(response);
    let narration = narration.trim();
    if narration.is_empty() {
        return Err(CaptionError::EmptyNarration);
    }
    Ok(bound_length(narration, MAX_NARRATION_CHARS))
}

/// Downscale to at most 640x480 JPEG before sending; the upstream model
/// does not need more and smaller payloads keep the call fast.
fn resize_for_caption(bytes: &[u8]) -> Result<Vec<u8>, CaptionError> {
    let img = image::load_from_memory(bytes).map_err(|e| CaptionError::InvalidImage(e.to_string()))?;
    let img = img.thumbnail(MAX_WIDTH, MAX_HEIGHT).to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| CaptionError::InvalidImage(e.to_string()))?;
    Ok(out)
}

fn scored_list<'a, I>(items: I) -> String
where
    I: Iterator<Item = (&'a str, f32)>,
{
    let parts: Vec<String> = items
        .map(|(name, score)| format!("{} ({:.2})", name, score))
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

/// Render the grounding template with the vision findings so the model has
/// structured facts to anchor the narration.
fn grounding_block(template: &str, vision: &VisionResult) -> String {
    let labels_text = scored_list(vision.labels.iter().map(|l| (l.description.as_str(), l.score)));
    let objects_text = scored_list(vision.objects.iter().map(|o| (o.name.as_str(), o.score)));
    let ocr = vision.ocr_text.trim();
    let ocr = if ocr.is_empty() { "none" } else { ocr };

    let mut block = template
        .replace("{labels_text}", &labels_text)
        .replace("{objects_text}", &objects_text)
        .replace("{ocr}", ocr);

    if let Some(safe) = &vision.safe_search {
        block.push_str(&format!(
            "\nSafeSearch flags: adult={}, violence={}, racy={}.",
            safe.adult, safe.violence, safe.racy
        ));
    }
    block
}

fn bound_length(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{LabelAnnotation, ObjectAnnotation, SafeSearchAnnotation};

    fn sample_vision() -> VisionResult {
        VisionResult {
            labels: vec![
                LabelAnnotation {
                    description: "Street".into(),
                    score: 0.954,
                },
                LabelAnnotation {
                    description: "Bicycle".into(),
                    score: 0.88,
                },
            ],
            objects: vec![ObjectAnnotation {
                name: "Bicycle".into(),
                score: 0.812,
                bounding_poly: vec![],
            }],
            ocr_text: "ONE WAY".into(),
            safe_search: None,
            partial_errors: Default::default(),
        }
    }

    #[test]
    fn grounding_block_renders_findings() {
        let template = "labels: {labels_text}; objects: {objects_text}; text: {ocr}";
        let block = grounding_block(template, &sample_vision());
        assert_eq!(
            block,
            "labels: Street (0.95), Bicycle (0.88); objects: Bicycle (0.81); text: ONE WAY"
        );
    }

    #[test]
    fn grounding_block_uses_none_for_missing_categories() {
        let template = "labels: {labels_text}; objects: {objects_text}; text: {ocr}";
        let block = grounding_block(template, &VisionResult::default());
        assert_eq!(block, "labels: none; objects: none; text: none");
    }

    #[test]
    fn grounding_block_appends_safe_search_note() {
        let mut vision = sample_vision();
        vision.safe_search = Some(SafeSearchAnnotation {
            adult: "VERY_UNLIKELY".into(),
            spoof: "UNLIKELY".into(),
            medical: "VERY_UNLIKELY".into(),
            violence: "LIKELY".into(),
            racy: "UNLIKELY".into(),
        });
        let block = grounding_block("{labels_text}", &vision);
        assert!(block.contains("SafeSearch flags: adult=VERY_UNLIKELY, violence=LIKELY"));
    }

    #[test]
    fn resize_produces_bounded_jpeg() {
        let source = image::RgbImage::from_pixel(1280, 960, image::Rgb([120, 30, 200]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(source)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let jpeg = resize_for_caption(&png).unwrap();
        let resized = image::load_from_memory(&jpeg).unwrap();
        assert!(resized.width() <= 640);
        assert!(resized.height() <= 480);
        assert_eq!(image::guess_format(&jpeg).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn resize_rejects_non_image_bytes() {
        assert!(matches!(
            resize_for_caption(b"definitely not an image"),
            Err(CaptionError::InvalidImage(_))
        ));
    }

    #[test]
    fn blank_model_text_is_a_malformed_response() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "   " },
                    { "text": "\n\t" }
                ]}
            }]
        });
        assert!(matches!(
            narration_from_response(&body),
            Err(CaptionError::EmptyNarration)
        ));
        assert!(matches!(
            narration_from_response(&json!({ "candidates": [] })),
            Err(CaptionError::EmptyNarration)
        ));

        let mapped = crate::error::ApiError::from(CaptionError::EmptyNarration);
        assert_eq!(mapped.kind(), "upstream_protocol");
    }

    #[test]
    fn usable_model_text_is_trimmed_and_bounded() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "  A quiet street corner.  " }] }
            }]
        });
        assert_eq!(
            narration_from_response(&body).unwrap(),
            "A quiet street corner."
        );

        let long = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "x".repeat(5000) }] }
            }]
        });
        assert_eq!(
            narration_from_response(&long).unwrap().chars().count(),
            MAX_NARRATION_CHARS
        );
    }

    #[test]
    fn narration_is_length_bounded() {
        let long = "a".repeat(5000);
        assert_eq!(bound_length(&long, MAX_NARRATION_CHARS).chars().count(), MAX_NARRATION_CHARS);
        assert_eq!(bound_length("short", MAX_NARRATION_CHARS), "short");
    }
}
