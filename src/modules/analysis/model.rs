use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "IN_PROGRESS" => JobStatus::InProgress,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// Dedup Cache record for one source url.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VideoTask {
    pub source_url: String,
    pub task_id: String,
    pub object_key: String,
    pub storage_bucket: String,
    /// Unix seconds after which the store drops the record.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// One label reported by the detector, usually once per analysed frame.
/// Kept in the detector's own record shape so raw results pass through as
/// reported.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct RawLabelObservation {
    /// Milliseconds from the start of the video
    pub timestamp: i64,
    pub label: DetectedLabel,
}

impl RawLabelObservation {
    pub fn label_name(&self) -> &str {
        &self.label.name
    }

    pub fn confidence(&self) -> f64 {
        f64::from(self.label.confidence)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
    #[serde(default)]
    pub instances: Vec<LabelInstance>,
    #[serde(default)]
    pub parents: Vec<LabelName>,
    #[serde(default)]
    pub aliases: Vec<LabelName>,
    #[serde(default)]
    pub categories: Vec<LabelName>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct LabelInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Ratios of the frame size.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct LabelName {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedLabel {
    pub label: String,
    pub count: u64,
    pub total_confidence: f64,
    pub average_confidence: f64,
}
