use reqwest::Client as HttpClient;
use serde_json::Value;
use thiserror::Error;

use crate::error::{ApiError, truncate_detail};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Failures shared by the caption and speech delegates, which both speak
/// the `models/{model}:generateContent` protocol.
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("generative API authentication failed: {0}")]
    Auth(String),
    #[error("generative API unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected generative API response: {0}")]
    Protocol(String),
}

impl From<GeminiError> for ApiError {
    fn from(e: GeminiError) -> Self {
        match e {
            GeminiError::Auth(m) => ApiError::Auth(m),
            GeminiError::Unavailable(m) => ApiError::Transient(m),
            GeminiError::Protocol(m) => ApiError::Protocol(m),
        }
    }
}

/// POST a `generateContent` request and decode the JSON body. One outbound
/// call, no retries. A missing key fails before any network traffic.
pub async fn generate_content(
    client: &HttpClient,
    base_url: &str,
    model: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Value, GeminiError> {
    let api_key = api_key.ok_or_else(|| GeminiError::Auth("GEMINI_API_KEY is not set".into()))?;
    // The key travels as a query parameter; never log this URL.
    let url = format!("{}/models/{}:generateContent?key={}", base_url, model, api_key);
    let resp = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(classify_transport)?;
    let status = resp.status();
    let text = resp.text().await.map_err(classify_transport)?;
    if !status.is_success() {
        return Err(classify_http(status.as_u16(), &text));
    }
    serde_json::from_str(&text)
        .map_err(|e| GeminiError::Protocol(format!("undecodable body: {}", e)))
}

fn classify_transport(e: reqwest::Error) -> GeminiError {
    if e.is_timeout() || e.is_connect() {
        GeminiError::Unavailable(e.to_string())
    } else {
        GeminiError::Protocol(e.to_string())
    }
}

// The generative API signals a bad key as HTTP 400 with an API_KEY_INVALID
// detail, not as 401.
pub fn classify_http(status: u16, body: &str) -> GeminiError {
    let detail = truncate_detail(body);
    match status {
        400 if body.contains("API_KEY_INVALID") || body.contains("API key") => {
            GeminiError::Auth(detail)
        }
        401 | 403 => GeminiError::Auth(detail),
        429 | 500..=599 => GeminiError::Unavailable(detail),
        _ => GeminiError::Protocol(detail),
    }
}

/// Concatenate every text part of the first candidate, mirroring how the
/// streaming variant of this call is consumed chunk by chunk.
pub fn collect_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
