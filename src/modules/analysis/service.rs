use tracing::{debug, error, info};
use url::Url;
use validator::{Validate, ValidationErrors};

use super::aggregate::{AggregateOptions, ResultAggregator};
use super::dto::{
    AnalysisResults, AnalysisResultsQuery, AnalyzeVideoRequest, AnalyzeVideoResponse, IntakeOutcome,
};
use super::events::QueueMessage;
use super::model::JobStatus;
use super::repository::{Registration, TaskMetadata};
use crate::common::error::{PipelineError, PipelineResult};
use crate::state::AppState;

// Length of a YouTube video id, which ends every watch url
const TASK_ID_LEN: usize = 11;
const OBJECT_EXTENSION: &str = ".mp4";

pub struct AnalysisService;

impl AnalysisService {
    // --- INTAKE ---

    pub fn parse_request(body: &[u8]) -> PipelineResult<AnalyzeVideoRequest> {
        let req: AnalyzeVideoRequest = serde_json::from_slice(body).map_err(|e| {
            debug!("Rejected intake body: {}", e);
            if e.is_data() {
                PipelineError::validation("Invalid Body: Missing required fields")
            } else {
                PipelineError::validation("Invalid Body: Bad JSON")
            }
        })?;

        req.validate()
            .map_err(|e| PipelineError::validation(first_message(&e)))?;

        Ok(req)
    }

    /// `+` stands for a space in submitted urls; the rest is percent-decoded.
    pub fn decode_source_url(raw: &str) -> PipelineResult<String> {
        let replaced = raw.trim().replace('+', "%20");
        let decoded = urlencoding::decode(&replaced)
            .map_err(|_| PipelineError::validation("Invalid Body: Bad JSON"))?
            .into_owned();

        Url::parse(&decoded)
            .map_err(|e| PipelineError::validation(format!("Invalid video url {}: {}", decoded, e)))?;

        Ok(decoded)
    }

    /// Last 11 characters of the decoded url.
    pub fn derive_task_id(source_url: &str) -> String {
        let chars: Vec<char> = source_url.chars().collect();
        let start = chars.len().saturating_sub(TASK_ID_LEN);
        chars[start..].iter().collect()
    }

    pub async fn submit_video(state: AppState, website: &str, body: &[u8]) -> PipelineResult<IntakeOutcome> {
        let req = Self::parse_request(body)?;
        let source_url = Self::decode_source_url(&req.urls[0])?;
        let task_id = Self::derive_task_id(&source_url);
        let object_key = format!("{}{}", task_id, OBJECT_EXTENSION);

        info!("Intake from {}: task {} for {}", website, task_id, source_url);

        let metadata = TaskMetadata {
            task_id: task_id.clone(),
            object_key: object_key.clone(),
            storage_bucket: state.storage.bucket().to_string(),
        };

        let registration = state
            .cache
            .try_register(&source_url, metadata, state.config.task_ttl_secs)
            .await?;

        if let Registration::Rejected(existing) = registration {
            info!("Task {} already registered, skipping", task_id);
            return Ok(IntakeOutcome::Duplicate(AnalyzeVideoResponse {
                task_id,
                source_url,
                object_key,
                message_id: None,
                job_id: existing.and_then(|t| t.job_id),
            }));
        }

        let message = QueueMessage {
            source_url: source_url.clone(),
            task_id: task_id.clone(),
        };
        let payload = serde_json::to_vec(&message)
            .map_err(|e| PipelineError::Queue(e.to_string()))?;

        let message_id = match state.queue.enqueue(&payload).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to enqueue task {}: {}", task_id, e);
                // Let the client retry instead of waiting out the TTL
                if let Err(release_err) = state.cache.release(&source_url).await {
                    error!("Failed to release task {}: {}", task_id, release_err);
                }
                return Err(PipelineError::Queue(e.to_string()));
            }
        };

        info!("Queued task {} as message {}", task_id, message_id);

        Ok(IntakeOutcome::Accepted(AnalyzeVideoResponse {
            task_id,
            source_url,
            object_key,
            message_id: Some(message_id),
            job_id: None,
        }))
    }

    // --- RESULTS ---

    pub fn parse_options(query: &AnalysisResultsQuery) -> PipelineResult<AggregateOptions> {
        let count = query
            .count
            .as_deref()
            .map(|c| {
                c.trim()
                    .parse::<usize>()
                    .map_err(|_| PipelineError::validation(format!("Invalid count: {}", c)))
            })
            .transpose()?;

        Ok(AggregateOptions {
            count,
            raw: query.debug.as_deref() == Some("true"),
        })
    }

    pub async fn get_results(state: AppState, website: &str, query: AnalysisResultsQuery) -> PipelineResult<AnalysisResults> {
        let options = Self::parse_options(&query)?;
        debug!("Results from {}: {:?} {:?}", website, query, options);

        let job_id = match (query.id.filter(|id| !id.is_empty()), query.url) {
            (Some(id), _) => id,
            (None, Some(url)) => {
                let source_url = Self::decode_source_url(&url)?;
                let task = state
                    .cache
                    .lookup(&source_url)
                    .await?
                    .ok_or_else(|| PipelineError::not_found(format!("no task for {}", source_url)))?;

                match task.job_id {
                    Some(job_id) => job_id,
                    // Registered and queued, upload or submission still running
                    None => return Ok(AnalysisResults::empty(JobStatus::Pending, None)),
                }
            }
            (None, None) => return Err(PipelineError::validation("No JobId")),
        };

        ResultAggregator::new(state.detector.clone())
            .aggregate(&job_id, options)
            .await
    }
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}
