use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client as HttpClient;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::gemini::{self, GeminiError};

const MODEL: &str = "gemini-2.5-flash-preview-tts";
const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Synthesized speech ready to stream back to the caller.
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("narration text is empty")]
    EmptyText,
    #[error("no audio data in response: {0}")]
    MissingAudio(String),
    #[error(transparent)]
    Gemini(#[from] GeminiError),
}

impl From<TtsError> for ApiError {
    fn from(e: TtsError) -> Self {
        match e {
            // The handler never calls speech with empty text, so this is a
            // pipeline bug rather than a client problem.
            TtsError::EmptyText => ApiError::Internal("narration text is empty".into()),
            TtsError::MissingAudio(m) => ApiError::Protocol(m),
            TtsError::Gemini(inner) => inner.into(),
        }
    }
}

/// Wraps the generative TTS call and packages the returned PCM stream as a
/// WAV file.
#[derive(Clone)]
pub struct SpeechService {
    client: HttpClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl SpeechService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: HttpClient::new(),
            api_key: config.gemini_api_key.clone(),
            base_url: gemini::DEFAULT_BASE_URL.to_string(),
            model: MODEL.to_string(),
            voice: config.tts_voice.clone(),
            sample_rate: config.tts_sample_rate,
        }
    }

    pub async fn synthesize(&self, text: &str) -> Result<AudioArtifact, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        });

        let response = gemini::generate_content(
            &self.client,
            &self.base_url,
            &self.model,
            self.api_key.as_deref(),
            &body,
        )
        .await?;

        let (pcm, sample_rate) = extract_audio(&response, self.sample_rate)?;
        Ok(AudioArtifact {
            bytes: pcm_to_wav(&pcm, CHANNELS, sample_rate, BITS_PER_SAMPLE),
            content_type: "audio/wav",
        })
    }
}

/// Pull the base64 PCM payload out of a generateContent response. The
/// advertised mime type (e.g. "audio/L16;codec=pcm;rate=24000") carries the
/// actual sample rate; fall back to the configured one when absent.
fn extract_audio(body: &Value, fallback_rate: u32) -> Result<(Vec<u8>, u32), TtsError> {
    let inline = body
        .pointer("/candidates/0/content/parts/0/inlineData")
        .ok_or_else(|| TtsError::MissingAudio("response has no inline audio part".into()))?;
    let data = inline
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| TtsError::MissingAudio("inline part has no data field".into()))?;
    let pcm = STANDARD
        .decode(data)
        .map_err(|e| TtsError::MissingAudio(format!("undecodable audio payload: {}", e)))?;
    if pcm.is_empty() {
        return Err(TtsError::MissingAudio("audio payload is empty".into()));
    }
    let rate = inline
        .get("mimeType")
        .and_then(Value::as_str)
        .and_then(parse_pcm_rate)
        .unwrap_or(fallback_rate);
    Ok((pcm, rate))
}

// Sample rates outside this window are not plausible speech output; the
// upstream value is untrusted and a huge rate would overflow the WAV
// byte-rate arithmetic.
const MIN_PCM_RATE: u32 = 8_000;
const MAX_PCM_RATE: u32 = 192_000;

fn parse_pcm_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .find_map(|part| part.trim().strip_prefix("rate="))
        .and_then(|rate| rate.parse().ok())
        .filter(|rate| (MIN_PCM_RATE..=MAX_PCM_RATE).contains(rate))
}

/// Prepend a 44-byte RIFF/WAVE header to raw little-endian PCM samples.
fn pcm_to_wav(pcm: &[u8], channels: u16, sample_rate: u32, bits_per_sample: u16) -> Vec<u8> {
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}
