use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::ports::LabelDetector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// Starts label-detection jobs. Submitting the same object with the same
/// token resolves to the job created the first time.
#[derive(Clone)]
pub struct JobSubmitter {
    detector: Arc<dyn LabelDetector>,
}

impl JobSubmitter {
    pub fn new(detector: Arc<dyn LabelDetector>) -> Self {
        Self { detector }
    }

    /// Stable per source url, 36 chars of `[0-9a-f-]`, which fits the
    /// detector's client-token alphabet whatever the url contains.
    pub fn idempotency_token(source_url: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, source_url.as_bytes()).to_string()
    }

    pub async fn submit(&self, object: &ObjectRef, idempotency_token: &str) -> PipelineResult<String> {
        info!("StartLabelDetection on {}/{}", object.bucket, object.key);

        let job_id = self
            .detector
            .start_job(&object.bucket, &object.key, idempotency_token)
            .await
            .map_err(|e| {
                error!("Failed to start label detection for {}: {}", object.key, e);
                PipelineError::SubmissionFailed(e.to_string())
            })?;

        info!("Label detection job {} started for {}", job_id, object.key);
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDetector;

    fn object() -> ObjectRef {
        ObjectRef {
            bucket: "video-cache".into(),
            key: "ABCDEFGHIJK.mp4".into(),
        }
    }

    #[test]
    fn token_is_stable_and_well_formed() {
        let url = "https://example.com/watch?v=ABCDEFGHIJK&list=x y";
        let token = JobSubmitter::idempotency_token(url);

        assert_eq!(token, JobSubmitter::idempotency_token(url));
        assert_ne!(token, JobSubmitter::idempotency_token("https://example.com/other"));
        assert!(token.len() <= 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn resubmission_with_same_token_returns_same_job() {
        let detector = Arc::new(FakeDetector::default());
        let submitter = JobSubmitter::new(detector.clone());
        let token = JobSubmitter::idempotency_token("https://example.com/watch?v=ABCDEFGHIJK");

        let first = submitter.submit(&object(), &token).await.unwrap();
        let second = submitter.submit(&object(), &token).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(detector.jobs_created(), 1);
    }

    #[tokio::test]
    async fn rejected_submission_is_submission_failed() {
        let detector = Arc::new(FakeDetector::rejecting());
        let submitter = JobSubmitter::new(detector);

        let err = submitter.submit(&object(), "token").await.unwrap_err();
        assert!(matches!(err, PipelineError::SubmissionFailed(_)));
    }
}
