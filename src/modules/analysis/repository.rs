use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::model::VideoTask;
use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::ports::{JobIdUpdate, TaskStore};

/// What the caller knows about a task before it is registered.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    pub task_id: String,
    pub object_key: String,
    pub storage_bucket: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Accepted(VideoTask),
    /// A live record already exists. It may have expired again by the time
    /// it was read back, hence the `Option`.
    Rejected(Option<VideoTask>),
}

impl Registration {
    pub fn accepted(&self) -> bool {
        matches!(self, Registration::Accepted(_))
    }
}

/// Dedup Cache: one record per source url, guarded by a conditional write
/// and dropped by the store once its TTL runs out.
#[derive(Clone)]
pub struct DedupCache {
    store: Arc<dyn TaskStore>,
}

impl DedupCache {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn try_register(
        &self,
        source_url: &str,
        metadata: TaskMetadata,
        ttl_secs: u64,
    ) -> PipelineResult<Registration> {
        let expires_at = expiry(OffsetDateTime::now_utc().unix_timestamp(), ttl_secs);
        let task = VideoTask {
            source_url: source_url.to_string(),
            task_id: metadata.task_id,
            object_key: metadata.object_key,
            storage_bucket: metadata.storage_bucket,
            expires_at,
            job_id: None,
        };

        let inserted = self
            .store
            .put_if_absent(source_url, &task, ttl_secs)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        if inserted {
            debug!("Registered task {} for {}", task.task_id, source_url);
            return Ok(Registration::Accepted(task));
        }

        Ok(Registration::Rejected(self.lookup(source_url).await?))
    }

    pub async fn lookup(&self, source_url: &str) -> PipelineResult<Option<VideoTask>> {
        let task = self
            .store
            .get(source_url)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        Ok(task.filter(|t| t.expires_at > now))
    }

    pub async fn attach_job_id(&self, source_url: &str, job_id: &str) -> PipelineResult<()> {
        let update = self
            .store
            .set_job_id(source_url, job_id)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        match update {
            JobIdUpdate::Updated => Ok(()),
            JobIdUpdate::Missing => Err(PipelineError::not_found(format!(
                "no live task for {}",
                source_url
            ))),
            JobIdUpdate::Conflict(existing) => {
                warn!("Task {} already bound to job {}, not {}", source_url, existing, job_id);
                Err(PipelineError::Store(format!(
                    "task already bound to job {}",
                    existing
                )))
            }
        }
    }

    /// Drops the record so the url can be registered again.
    pub async fn release(&self, source_url: &str) -> PipelineResult<()> {
        self.store
            .delete(source_url)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))
    }
}

fn expiry(now: i64, ttl_secs: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}
