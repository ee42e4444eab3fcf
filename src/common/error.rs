use axum::http::StatusCode;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced by the pipeline components.
///
/// A duplicate intake is not a failure and has no variant here; see
/// `IntakeOutcome::Duplicate`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Task store error: {0}")]
    Store(String),

    #[error("Task queue error: {0}")]
    Queue(String),

    #[error("Detector error: {0}")]
    Detector(String),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Validation(_) | PipelineError::NotFound(_) => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}
