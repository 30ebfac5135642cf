use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single label detected in an image, with the service's confidence score.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LabelAnnotation {
    pub description: String,
    pub score: f32,
}

/// Normalized vertex of an object bounding polygon (0.0..=1.0 per axis).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Vertex {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

/// A localized object with its bounding polygon.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectAnnotation {
    pub name: String,
    pub score: f32,
    pub bounding_poly: Vec<Vertex>,
}

/// Explicit-content likelihood flags, as likelihood names
/// ("VERY_UNLIKELY" .. "VERY_LIKELY").
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SafeSearchAnnotation {
    pub adult: String,
    pub spoof: String,
    pub medical: String,
    pub violence: String,
    pub racy: String,
}

/// Normalized result of one vision analysis call.
///
/// Categories the service did not return are empty rather than absent.
/// A category that came back unusable is left empty and recorded in
/// `partial_errors` under its category name; the request as a whole still
/// succeeds.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VisionResult {
    pub labels: Vec<LabelAnnotation>,
    pub objects: Vec<ObjectAnnotation>,
    pub ocr_text: String,
    pub safe_search: Option<SafeSearchAnnotation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partial_errors: BTreeMap<String, String>,
}

impl VisionResult {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
            && self.objects.is_empty()
            && self.ocr_text.is_empty()
            && self.safe_search.is_none()
    }
}

/// Body of a successful `POST /upload` response.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadResponse {
    pub vision: VisionResult,
}

/// Error body returned by every failing endpoint. `kind` distinguishes
/// client-input, authentication, transient-upstream, upstream-protocol and
/// internal failures without exposing credential material.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
