use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub type Rgb = [u8; 3];

/// One keyframe as returned by the retrieval backend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Frame {
    pub video_id: String,
    pub frame_id: String,
    pub score: f64,
    pub timestamp: f64,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub dominant_colors: Vec<Rgb>,
    #[serde(default)]
    pub text: Vec<String>,
}

impl Frame {
    /// Frame number used by the still-image endpoint: everything after the
    /// first `_` of the frame id (`frame_12` -> `12`).
    pub fn frame_number(&self) -> &str {
        match self.frame_id.split_once('_') {
            Some((_, number)) => number,
            None => &self.frame_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGroup {
    pub video_id: String,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectsContain {
    #[default]
    Any,
    All,
    Only,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchSettings {
    pub max_results: u32,
    pub color_radius: u32,
    pub max_text_similarity: f64,
    pub max_image_similarity: f64,
    pub objects_contain: ObjectsContain,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 100,
            color_radius: 5,
            max_text_similarity: 0.9,
            max_image_similarity: 0.9,
            objects_contain: ObjectsContain::Any,
        }
    }
}

/// Normalized search payload. Disabled modalities serialize as `null`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub text_query: Option<String>,
    pub color_query: Option<Rgb>,
    pub object_query: Option<Vec<String>>,
    pub image_query: Option<String>,
    pub word_query: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: CompiledQuery,
    pub search_params: SearchSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameListResponse {
    pub data: Vec<Frame>,
}

// DRES wire types

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvaluationInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAnswer {
    pub media_item_name: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnswerSet {
    pub answers: Vec<SubmissionAnswer>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub answer_sets: Vec<AnswerSet>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub submission: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionOutcome {
    Correct,
    Wrong,
    Indeterminate,
    Undecidable,
    #[strum(default)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub outcome: SubmissionOutcome,
    pub description: String,
}

impl SubmissionResult {
    pub fn is_correct(&self) -> bool {
        self.outcome == SubmissionOutcome::Correct
    }
}

impl From<SubmissionResponse> for SubmissionResult {
    fn from(response: SubmissionResponse) -> Self {
        let outcome = response
            .submission
            .as_deref()
            .unwrap_or_default()
            .parse()
            .unwrap_or_else(|_| SubmissionOutcome::Other(String::new()));
        Self {
            outcome,
            description: response.description,
        }
    }
}
