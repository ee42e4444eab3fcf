//! Boundaries to the managed services the pipeline talks to.
//!
//! Every adapter reports failures as `anyhow::Error`; the components in
//! `modules::analysis` and `common::upload` decide which pipeline error a
//! failure turns into.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::modules::analysis::model::{JobStatus, RawLabelObservation, VideoTask};

/// Durable key-value store holding one `VideoTask` per source url.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts `task` under `key` only if no live record exists. Returns
    /// `false` when the key is already taken.
    async fn put_if_absent(&self, key: &str, task: &VideoTask, ttl_secs: u64) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<VideoTask>>;

    /// Sets `job_id` on an existing record without touching its expiry.
    async fn set_job_id(&self, key: &str, job_id: &str) -> Result<JobIdUpdate>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobIdUpdate {
    Updated,
    Missing,
    /// The record already carries a different job id, which is kept.
    Conflict(String),
}

/// A message pulled from the task queue. `delivery_tag` is the handle passed
/// back to `ack`; it is only meaningful to the queue that produced it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub payload: Vec<u8>,
    pub redelivered: bool,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Publishes `payload` and returns the message id assigned to it.
    async fn enqueue(&self, payload: &[u8]) -> Result<String>;

    /// Waits for the next message. `None` means the consumer was closed.
    async fn dequeue(&self) -> Result<Option<Delivery>>;

    async fn ack(&self, delivery_tag: u64) -> Result<()>;
}

/// Multi-part blob upload. Nothing is readable under `key` until
/// `complete_multipart_upload` succeeds.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Pull-based producer of a video's bytes, keyed by its url.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<ByteStream>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelPage {
    pub status: JobStatus,
    pub status_message: Option<String>,
    pub observations: Vec<RawLabelObservation>,
    pub next_token: Option<String>,
}

/// Asynchronous label-detection service.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Starts a job; the same `idempotency_token` always yields the same job id.
    async fn start_job(&self, bucket: &str, key: &str, idempotency_token: &str) -> Result<String>;

    async fn get_job_status(&self, job_id: &str, next_token: Option<&str>) -> Result<LabelPage>;
}
