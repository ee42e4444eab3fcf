use crate::common::error::{PipelineError, PipelineResult};
use crate::common::upload::UploadBridge;
use crate::infrastructure::ports::Delivery;
use crate::modules::analysis::events::QueueMessage;
use crate::modules::analysis::submitter::{JobSubmitter, ObjectRef};
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

// Back-off after the consumer itself fails
const CONSUMER_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Submitted(String),
    /// Redelivered after the job id was already recorded
    AlreadySubmitted(String),
}

pub async fn start_analysis_worker(state: AppState) {
    let concurrency = state.config.worker_concurrency;
    info!("🎥 Starting analysis worker ({} concurrent tasks)", concurrency);

    let permits = Arc::new(Semaphore::new(concurrency));

    loop {
        let permit = match permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };

        let delivery = match state.queue.dequeue().await {
            Ok(Some(d)) => d,
            Ok(None) => {
                warn!("Task queue consumer closed, stopping worker");
                break;
            }
            Err(e) => {
                error!("❌ Failed to receive task: {}", e);
                tokio::time::sleep(CONSUMER_RETRY_DELAY).await;
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            handle_delivery(&state, delivery).await;
            drop(permit);
        });
    }

    // Let in-flight tasks finish before returning
    let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
    if permits.acquire_many(all).await.is_ok() {
        info!("Analysis worker stopped");
    }
}

/// Runs one delivery and acknowledges it whatever the outcome. Failed tasks
/// are dropped; only a crash before the ack brings a task back.
pub async fn handle_delivery(state: &AppState, delivery: Delivery) {
    info!("📦 Received analysis task (redelivered: {})", delivery.redelivered);

    match serde_json::from_slice::<QueueMessage>(&delivery.payload) {
        Ok(task) => match process_task(state, &task).await {
            Ok(TaskOutcome::Submitted(job_id)) => {
                info!("✅ Task {} submitted as job {}", task.task_id, job_id);
            }
            Ok(TaskOutcome::AlreadySubmitted(job_id)) => {
                info!("Task {} already has job {}, nothing to do", task.task_id, job_id);
            }
            Err(e) => {
                error!("❌ Failed to process task {}: {}", task.task_id, e);
                release_failed_task(state, &task, &e).await;
            }
        },
        Err(e) => {
            error!("❌ Failed to parse task: {}", e);
        }
    }

    if let Err(e) = state.queue.ack(delivery.delivery_tag).await {
        error!("Failed to ack message: {}", e);
    }
}

/// The ack below ends the task for good, so a run that failed while
/// fetching, uploading or submitting frees its url for a fresh submission.
/// Other failures leave the record alone: it is gone already, or it may
/// carry a job id that must be kept.
async fn release_failed_task(state: &AppState, task: &QueueMessage, err: &PipelineError) {
    let retryable = matches!(
        err,
        PipelineError::SourceUnavailable(_)
            | PipelineError::UploadFailed(_)
            | PipelineError::SubmissionFailed(_)
    );
    if !retryable {
        return;
    }

    match state.cache.release(&task.source_url).await {
        Ok(()) => info!("Released task {} for resubmission", task.task_id),
        Err(e) => error!("Failed to release task {}: {}", task.task_id, e),
    }
}

/// register → stream-and-upload → submit → record job id. Registration
/// happened at intake; the record must still be live here.
pub async fn process_task(state: &AppState, task: &QueueMessage) -> PipelineResult<TaskOutcome> {
    info!("Processing task {} for {}", task.task_id, task.source_url);

    let record = state
        .cache
        .lookup(&task.source_url)
        .await?
        .ok_or_else(|| PipelineError::not_found(format!("no live task for {}", task.source_url)))?;

    if let Some(job_id) = record.job_id {
        return Ok(TaskOutcome::AlreadySubmitted(job_id));
    }

    info!("⬆️ Streaming {} to {}/{}", task.source_url, record.storage_bucket, record.object_key);
    UploadBridge::from_state(state)
        .bridge(&task.source_url, &record.object_key)
        .await?;

    let object = ObjectRef {
        bucket: record.storage_bucket,
        key: record.object_key,
    };
    let token = JobSubmitter::idempotency_token(&task.source_url);
    let job_id = JobSubmitter::new(state.detector.clone())
        .submit(&object, &token)
        .await?;

    state.cache.attach_job_id(&task.source_url, &job_id).await?;

    Ok(TaskOutcome::Submitted(job_id))
}
