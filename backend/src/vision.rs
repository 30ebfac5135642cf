use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use shared::{LabelAnnotation, ObjectAnnotation, SafeSearchAnnotation, Vertex, VisionResult};
use std::path::Path;
use thiserror::Error;

use crate::config::AppConfig;
use crate::error::{ApiError, truncate_detail};

const DEFAULT_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
const MAX_RESULTS: u32 = 10;

/// Analysis categories that can be requested from the vision API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionFeature {
    Labels,
    Objects,
    Text,
    SafeSearch,
}

impl VisionFeature {
    pub fn api_name(&self) -> &'static str {
        match self {
            VisionFeature::Labels => "LABEL_DETECTION",
            VisionFeature::Objects => "OBJECT_LOCALIZATION",
            VisionFeature::Text => "TEXT_DETECTION",
            VisionFeature::SafeSearch => "SAFE_SEARCH_DETECTION",
        }
    }

    pub fn all() -> [VisionFeature; 4] {
        [
            VisionFeature::Labels,
            VisionFeature::Objects,
            VisionFeature::Text,
            VisionFeature::SafeSearch,
        ]
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision API rejected the image: {0}")]
    InvalidImage(String),
    #[error("vision API authentication failed: {0}")]
    Auth(String),
    #[error("vision API unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected vision API response: {0}")]
    Protocol(String),
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VisionError> for ApiError {
    fn from(e: VisionError) -> Self {
        match e {
            VisionError::InvalidImage(m) => ApiError::BadRequest(m),
            VisionError::Auth(m) => ApiError::Auth(m),
            VisionError::Unavailable(m) => ApiError::Transient(m),
            VisionError::Protocol(m) => ApiError::Protocol(m),
            VisionError::Io(m) => ApiError::Internal(m.to_string()),
        }
    }
}

/// Wraps the `images:annotate` REST call. One outbound request per
/// annotate; no retries.
#[derive(Clone)]
pub struct VisionService {
    client: HttpClient,
    api_key: Option<String>,
    endpoint: String,
}

impl VisionService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: HttpClient::new(),
            api_key: config.vision_api_key.clone(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub async fn annotate_file(
        &self,
        path: &Path,
        features: &[VisionFeature],
    ) -> Result<VisionResult, VisionError> {
        let bytes = std::fs::read(path)?;
        self.annotate(&bytes, features).await
    }

    pub async fn annotate(
        &self,
        image: &[u8],
        features: &[VisionFeature],
    ) -> Result<VisionResult, VisionError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            VisionError::Auth(
                "no vision API key configured (set GOOGLE_VISION_API_KEY or GEMINI_API_KEY)".into(),
            )
        })?;

        let feature_specs: Vec<Value> = features
            .iter()
            .map(|f| json!({ "type": f.api_name(), "maxResults": MAX_RESULTS }))
            .collect();
        let body = json!({
            "requests": [{
                "image": { "content": STANDARD.encode(image) },
                "features": feature_specs,
            }]
        });

        // The key travels as a query parameter; never log this URL.
        let url = format!("{}?key={}", self.endpoint, api_key);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_http(status.as_u16(), &text));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| VisionError::Protocol(format!("undecodable annotate body: {}", e)))?;
        parse_annotate_response(&value)
    }
}

fn classify_transport(e: reqwest::Error) -> VisionError {
    if e.is_timeout() || e.is_connect() {
        VisionError::Unavailable(e.to_string())
    } else {
        VisionError::Protocol(e.to_string())
    }
}

fn classify_http(status: u16, body: &str) -> VisionError {
    let detail = truncate_detail(body);
    match status {
        400 => VisionError::InvalidImage(detail),
        401 | 403 => VisionError::Auth(detail),
        429 | 500..=599 => VisionError::Unavailable(detail),
        _ => VisionError::Protocol(detail),
    }
}

// Canonical google.rpc codes carried in annotate response entries.
fn classify_status(code: i64, message: String) -> VisionError {
    match code {
        3 => VisionError::InvalidImage(message),
        7 | 16 => VisionError::Auth(message),
        4 | 8 | 14 => VisionError::Unavailable(message),
        _ => VisionError::Protocol(message),
    }
}

#[derive(Debug, Deserialize)]
struct GoogleLabel {
    description: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleObject {
    name: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    bounding_poly: GoogleBoundingPoly,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleBoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<Vertex>,
}

/// Normalize one `AnnotateImageResponse`.
///
/// Each category is decoded independently: a category that fails to decode
/// is returned empty with an entry in `partial_errors` instead of failing
/// the whole call. A response-level `error` with no usable annotations at
/// all fails the call; alongside partial data it becomes a marker.
fn parse_annotate_response(value: &Value) -> Result<VisionResult, VisionError> {
    let entry = value
        .pointer("/responses/0")
        .ok_or_else(|| VisionError::Protocol("annotate body has no responses".into()))?;

    let mut result = VisionResult::default();

    if let Some(labels) = entry.get("labelAnnotations") {
        match serde_json::from_value::<Vec<GoogleLabel>>(labels.clone()) {
            Ok(labels) => {
                result.labels = labels
                    .into_iter()
                    .map(|l| LabelAnnotation {
                        description: l.description,
                        score: l.score,
                    })
                    .collect();
            }
            Err(e) => {
                result.partial_errors.insert("labels".into(), e.to_string());
            }
        }
    }

    if let Some(objects) = entry.get("localizedObjectAnnotations") {
        match serde_json::from_value::<Vec<GoogleObject>>(objects.clone()) {
            Ok(objects) => {
                result.objects = objects
                    .into_iter()
                    .map(|o| ObjectAnnotation {
                        name: o.name,
                        score: o.score,
                        bounding_poly: o.bounding_poly.normalized_vertices,
                    })
                    .collect();
            }
            Err(e) => {
                result.partial_errors.insert("objects".into(), e.to_string());
            }
        }
    }

    result.ocr_text = entry
        .pointer("/fullTextAnnotation/text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Some(safe) = entry.get("safeSearchAnnotation") {
        match serde_json::from_value::<SafeSearchAnnotation>(safe.clone()) {
            Ok(safe) => result.safe_search = Some(safe),
            Err(e) => {
                result
                    .partial_errors
                    .insert("safe_search".into(), e.to_string());
            }
        }
    }

    if let Some(err) = entry.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown annotate error")
            .to_string();
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
        if result.is_empty() && result.partial_errors.is_empty() {
            return Err(classify_status(code, message));
        }
        result.partial_errors.insert("vision".into(), message);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_api_names() {
        assert_eq!(VisionFeature::Labels.api_name(), "LABEL_DETECTION");
        assert_eq!(VisionFeature::SafeSearch.api_name(), "SAFE_SEARCH_DETECTION");
        assert_eq!(VisionFeature::all().len(), 4);
    }

    #[test]
    fn parses_full_response() {
        let body = json!({
            "responses": [{
                "labelAnnotations": [
                    { "description": "Street", "score": 0.95 },
                    { "description": "Bicycle", "score": 0.88 }
                ],
                "localizedObjectAnnotations": [{
                    "name": "Bicycle",
                    "score": 0.81,
                    "boundingPoly": {
                        "normalizedVertices": [
                            { "x": 0.1, "y": 0.2 },
                            { "x": 0.5 }
                        ]
                    }
                }],
                "fullTextAnnotation": { "text": "ONE WAY" },
                "safeSearchAnnotation": {
                    "adult": "VERY_UNLIKELY",
                    "spoof": "UNLIKELY",
                    "medical": "VERY_UNLIKELY",
                    "violence": "UNLIKELY",
                    "racy": "VERY_UNLIKELY"
                }
            }]
        });

        let result = parse_annotate_response(&body).unwrap();
        assert_eq!(result.labels.len(), 2);
        assert_eq!(result.labels[0].description, "Street");
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].bounding_poly[1].y, 0.0);
        assert_eq!(result.ocr_text, "ONE WAY");
        assert_eq!(result.safe_search.as_ref().unwrap().adult, "VERY_UNLIKELY");
        assert!(result.partial_errors.is_empty());
    }

    #[test]
    fn missing_categories_are_empty() {
        let body = json!({ "responses": [{}] });
        let result = parse_annotate_response(&body).unwrap();
        assert!(result.labels.is_empty());
        assert!(result.objects.is_empty());
        assert_eq!(result.ocr_text, "");
        assert!(result.safe_search.is_none());
        assert!(result.partial_errors.is_empty());
    }

    #[test]
    fn bad_category_becomes_partial_error() {
        let body = json!({
            "responses": [{
                "labelAnnotations": [{ "description": "Street", "score": 0.95 }],
                "localizedObjectAnnotations": "not an array"
            }]
        });
        let result = parse_annotate_response(&body).unwrap();
        assert_eq!(result.labels.len(), 1);
        assert!(result.objects.is_empty());
        assert!(result.partial_errors.contains_key("objects"));
    }

    #[test]
    fn whole_call_error_fails_when_no_data() {
        let body = json!({
            "responses": [{
                "error": { "code": 16, "message": "API key expired" }
            }]
        });
        match parse_annotate_response(&body) {
            Err(VisionError::Auth(m)) => assert!(m.contains("expired")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn error_alongside_data_becomes_marker() {
        let body = json!({
            "responses": [{
                "labelAnnotations": [{ "description": "Street", "score": 0.9 }],
                "error": { "code": 8, "message": "quota exceeded for OCR" }
            }]
        });
        let result = parse_annotate_response(&body).unwrap();
        assert_eq!(result.labels.len(), 1);
        assert!(result.partial_errors["vision"].contains("quota"));
    }

    #[test]
    fn empty_body_is_protocol_error() {
        let body = json!({});
        assert!(matches!(
            parse_annotate_response(&body),
            Err(VisionError::Protocol(_))
        ));
    }

    #[test]
    fn http_status_classification() {
        assert!(matches!(classify_http(400, "bad image"), VisionError::InvalidImage(_)));
        assert!(matches!(classify_http(401, ""), VisionError::Auth(_)));
        assert!(matches!(classify_http(403, ""), VisionError::Auth(_)));
        assert!(matches!(classify_http(429, ""), VisionError::Unavailable(_)));
        assert!(matches!(classify_http(503, ""), VisionError::Unavailable(_)));
        assert!(matches!(classify_http(418, ""), VisionError::Protocol(_)));
    }

    #[test]
    fn status_code_classification() {
        assert!(matches!(
            classify_status(3, "bad".into()),
            VisionError::InvalidImage(_)
        ));
        assert!(matches!(classify_status(7, "denied".into()), VisionError::Auth(_)));
        assert!(matches!(
            classify_status(14, "unavailable".into()),
            VisionError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(2, "unknown".into()),
            VisionError::Protocol(_)
        ));
    }
}
