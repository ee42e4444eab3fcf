use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::model::{AggregatedLabel, JobStatus, RawLabelObservation};

// --- INTAKE DTOs ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AnalyzeVideoRequest {
    #[validate(length(min = 1, max = 1, message = "For now, we only process one video url per post."))]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeVideoResponse {
    pub task_id: String,
    pub source_url: String,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Result of an intake request. A duplicate is a successful no-op.
#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    Accepted(AnalyzeVideoResponse),
    Duplicate(AnalyzeVideoResponse),
}

// --- RESULT DTOs ---

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalysisResultsQuery {
    /// Detector job id
    pub id: Option<String>,
    /// Source url, resolved to its job id
    pub url: Option<String>,
    /// Keep only the top `count` labels
    pub count: Option<String>,
    /// `true` returns the raw observations
    pub debug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LabelsView {
    Aggregated(Vec<AggregatedLabel>),
    Raw(Vec<RawLabelObservation>),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResults {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub labels: LabelsView,
}

impl AnalysisResults {
    pub fn empty(status: JobStatus, status_message: Option<String>) -> Self {
        Self {
            status,
            status_message,
            labels: LabelsView::Aggregated(Vec::new()),
        }
    }
}
