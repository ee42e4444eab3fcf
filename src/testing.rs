//! In-memory stand-ins for the managed services, used by unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::settings::AppConfig;
use crate::infrastructure::ports::{
    BlobStore, ByteStream, CompletedPart, Delivery, JobIdUpdate, LabelDetector, LabelPage,
    TaskQueue, TaskStore, VideoSource,
};
use crate::modules::analysis::events::QueueMessage;
use crate::modules::analysis::model::{DetectedLabel, JobStatus, RawLabelObservation, VideoTask};
use crate::modules::analysis::repository::DedupCache;
use crate::state::AppState;

const BUCKET: &str = "video-cache";

pub fn observation(label: &str, confidence: f32) -> RawLabelObservation {
    RawLabelObservation {
        timestamp: 0,
        label: DetectedLabel {
            name: label.to_string(),
            confidence,
            instances: Vec::new(),
            parents: Vec::new(),
            aliases: Vec::new(),
            categories: Vec::new(),
        },
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server_port: 0,
        redis_url: "redis://localhost".into(),
        rabbitmq_url: "amqp://localhost".into(),
        task_queue: "video_analysis_tasks".into(),
        video_cache_bucket: BUCKET.into(),
        s3_endpoint: None,
        aws_region: "us-east-1".into(),
        aws_access_key: "test".into(),
        aws_secret_key: "test".into(),
        task_ttl_secs: 120,
        upload_part_size_mb: 5,
        source_read_timeout_secs: 1,
        part_upload_timeout_secs: 1,
        worker_concurrency: 2,
        ytdl_bin: "yt-dlp".into(),
        ytdl_format: "best[ext=mp4]".into(),
        detector_min_confidence: None,
    }
}

// --- TASK STORE ---

/// Key-value store with a manual clock; records vanish once it passes
/// their deadline.
#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    now: u64,
    records: HashMap<String, (VideoTask, u64)>,
}

impl StoreInner {
    fn live(&mut self, key: &str) -> Option<&mut VideoTask> {
        let now = self.now;
        self.records.retain(|_, (_, deadline)| *deadline > now);
        self.records.get_mut(key).map(|(task, _)| task)
    }
}

impl InMemoryTaskStore {
    pub fn advance(&self, secs: u64) {
        self.inner.lock().unwrap().now += secs;
    }

    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now;
        inner.records.retain(|_, (_, deadline)| *deadline > now);
        inner.records.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put_if_absent(&self, key: &str, task: &VideoTask, ttl_secs: u64) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.live(key).is_some() {
            return Ok(false);
        }
        let deadline = inner.now.saturating_add(ttl_secs);
        inner.records.insert(key.to_string(), (task.clone(), deadline));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<VideoTask>> {
        Ok(self.inner.lock().unwrap().live(key).cloned())
    }

    async fn set_job_id(&self, key: &str, job_id: &str) -> Result<JobIdUpdate> {
        let mut inner = self.inner.lock().unwrap();
        let Some(task) = inner.live(key) else {
            return Ok(JobIdUpdate::Missing);
        };
        if let Some(existing) = task.job_id.as_ref().filter(|e| e.as_str() != job_id) {
            return Ok(JobIdUpdate::Conflict(existing.clone()));
        }
        task.job_id = Some(job_id.to_string());
        Ok(JobIdUpdate::Updated)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().unwrap().records.remove(key);
        Ok(())
    }
}

// --- TASK QUEUE ---

/// Queue whose `dequeue` never waits: an empty queue reads as closed.
#[derive(Default)]
pub struct InMemoryQueue {
    next_tag: AtomicU64,
    fail_enqueue: AtomicBool,
    pending: Mutex<VecDeque<Delivery>>,
    acked: Mutex<Vec<u64>>,
}

impl InMemoryQueue {
    pub fn fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn push_raw(&self, payload: Vec<u8>) -> u64 {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        self.pending.lock().unwrap().push_back(Delivery {
            delivery_tag,
            payload,
            redelivered: false,
        });
        delivery_tag
    }

    pub fn dequeue_now(&self) -> Option<Delivery> {
        self.pending.lock().unwrap().pop_front()
    }

    pub fn pending(&self) -> Vec<QueueMessage> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .filter_map(|d| serde_json::from_slice(&d.payload).ok())
            .collect()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, payload: &[u8]) -> Result<String> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(anyhow!("broker unreachable"));
        }
        self.push_raw(payload.to_vec());
        Ok(Uuid::new_v4().to_string())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>> {
        Ok(self.dequeue_now())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.acked.lock().unwrap().push(delivery_tag);
        Ok(())
    }
}

// --- BLOB STORE ---

struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<i32, Bytes>,
}

struct StoredObject {
    data: Vec<u8>,
    part_sizes: Vec<usize>,
    content_type: String,
}

#[derive(Default)]
struct BlobInner {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
    created: usize,
    completed: usize,
    aborted: usize,
}

/// Multi-part store; objects only appear once their upload completes.
#[derive(Default)]
pub struct InMemoryBlobStore {
    fail_part: Option<i32>,
    stall_part: Option<i32>,
    stall_abort: bool,
    inner: Mutex<BlobInner>,
}

impl InMemoryBlobStore {
    pub fn failing_part(part_number: i32) -> Self {
        Self {
            fail_part: Some(part_number),
            ..Default::default()
        }
    }

    /// Never answers the upload of `part_number`.
    pub fn stalling_part(part_number: i32) -> Self {
        Self {
            stall_part: Some(part_number),
            ..Default::default()
        }
    }

    pub fn with_stalled_abort(self) -> Self {
        Self {
            stall_abort: true,
            ..self
        }
    }

    pub fn bucket_name(&self) -> String {
        BUCKET.to_string()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(key).map(|o| o.data.clone())
    }

    pub fn part_sizes(&self, key: &str) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .get(key)
            .map(|o| o.part_sizes.clone())
            .unwrap_or_default()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().objects.get(key).map(|o| o.content_type.clone())
    }

    pub fn created_count(&self) -> usize {
        self.inner.lock().unwrap().created
    }

    pub fn completed_count(&self) -> usize {
        self.inner.lock().unwrap().completed
    }

    pub fn aborted_count(&self) -> usize {
        self.inner.lock().unwrap().aborted
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let upload_id = Uuid::new_v4().to_string();
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        inner.created += 1;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        if self.fail_part == Some(part_number) {
            return Err(anyhow!("part {} rejected", part_number));
        }
        if self.stall_part == Some(part_number) {
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock().unwrap();
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| anyhow!("no upload {}", upload_id))?;
        upload.parts.insert(part_number, body);
        Ok(CompletedPart {
            part_number,
            e_tag: format!("etag-{}", part_number),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let upload = inner
            .uploads
            .remove(upload_id)
            .ok_or_else(|| anyhow!("no upload {}", upload_id))?;

        let mut data = Vec::new();
        let mut part_sizes = Vec::new();
        for part in &parts {
            let body = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| anyhow!("missing part {}", part.part_number))?;
            data.extend_from_slice(body);
            part_sizes.push(body.len());
        }

        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                part_sizes,
                content_type: upload.content_type,
            },
        );
        inner.completed += 1;
        Ok(format!("{}/{}", BUCKET, key))
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        if self.stall_abort {
            std::future::pending::<()>().await;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.uploads.remove(upload_id);
        inner.aborted += 1;
        Ok(())
    }
}

// --- VIDEO SOURCE ---

#[derive(Clone)]
enum SourceEnd {
    Complete,
    Fail,
    Stall,
}

#[derive(Clone)]
pub struct FakeVideoSource {
    available: bool,
    chunks: Vec<Vec<u8>>,
    end: SourceEnd,
}

impl FakeVideoSource {
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            available: true,
            chunks,
            end: SourceEnd::Complete,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            chunks: Vec::new(),
            end: SourceEnd::Complete,
        }
    }

    pub fn failing_after(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            end: SourceEnd::Fail,
            ..Self::chunks(chunks)
        }
    }

    pub fn stalling_after(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            end: SourceEnd::Stall,
            ..Self::chunks(chunks)
        }
    }
}

#[async_trait]
impl VideoSource for FakeVideoSource {
    async fn open(&self, url: &str) -> Result<ByteStream> {
        if !self.available {
            return Err(anyhow!("unsupported url {}", url));
        }

        let body = stream::iter(
            self.chunks
                .clone()
                .into_iter()
                .map(|c| Ok::<_, io::Error>(Bytes::from(c))),
        );

        Ok(match self.end {
            SourceEnd::Complete => body.boxed(),
            SourceEnd::Fail => body
                .chain(stream::once(async { Err(io::Error::other("connection reset")) }))
                .boxed(),
            SourceEnd::Stall => body.chain(stream::pending()).boxed(),
        })
    }
}

// --- DETECTOR ---

struct FakeJob {
    status: JobStatus,
    status_message: Option<String>,
    observations: Vec<RawLabelObservation>,
}

#[derive(Default)]
struct DetectorInner {
    tokens: HashMap<String, String>,
    jobs: HashMap<String, FakeJob>,
    status_calls: HashMap<String, usize>,
}

/// Detector honouring idempotency tokens and paging results.
pub struct FakeDetector {
    reject: bool,
    page_size: usize,
    inner: Mutex<DetectorInner>,
}

impl Default for FakeDetector {
    fn default() -> Self {
        Self {
            reject: false,
            page_size: 1000,
            inner: Mutex::new(DetectorInner::default()),
        }
    }
}

impl FakeDetector {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn jobs_created(&self) -> usize {
        self.inner.lock().unwrap().tokens.len()
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.inner.lock().unwrap().status_calls.get(job_id).copied().unwrap_or(0)
    }

    fn set_job(&self, job_id: &str, job: FakeJob) {
        self.inner.lock().unwrap().jobs.insert(job_id.to_string(), job);
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        self.set_job(job_id, FakeJob {
            status,
            status_message: None,
            observations: Vec::new(),
        });
    }

    pub fn complete(&self, job_id: &str, observations: Vec<RawLabelObservation>) {
        self.set_job(job_id, FakeJob {
            status: JobStatus::Succeeded,
            status_message: None,
            observations,
        });
    }

    pub fn fail(&self, job_id: &str, message: &str) {
        self.set_job(job_id, FakeJob {
            status: JobStatus::Failed,
            status_message: Some(message.to_string()),
            observations: Vec::new(),
        });
    }
}

#[async_trait]
impl LabelDetector for FakeDetector {
    async fn start_job(&self, bucket: &str, key: &str, idempotency_token: &str) -> Result<String> {
        if self.reject {
            return Err(anyhow!("unsupported codec in {}/{}", bucket, key));
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(job_id) = inner.tokens.get(idempotency_token) {
            return Ok(job_id.clone());
        }
        let job_id = format!("job-{}", inner.tokens.len() + 1);
        inner.tokens.insert(idempotency_token.to_string(), job_id.clone());
        inner.jobs.insert(job_id.clone(), FakeJob {
            status: JobStatus::InProgress,
            status_message: None,
            observations: Vec::new(),
        });
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str, next_token: Option<&str>) -> Result<LabelPage> {
        let mut inner = self.inner.lock().unwrap();
        *inner.status_calls.entry(job_id.to_string()).or_default() += 1;

        let job = inner
            .jobs
            .get(job_id)
            .ok_or_else(|| anyhow!("invalid job id {}", job_id))?;

        if job.status != JobStatus::Succeeded {
            return Ok(LabelPage {
                status: job.status,
                status_message: job.status_message.clone(),
                observations: Vec::new(),
                next_token: None,
            });
        }

        let start: usize = next_token.map(|t| t.parse()).transpose()?.unwrap_or(0);
        let end = (start + self.page_size).min(job.observations.len());

        Ok(LabelPage {
            status: job.status,
            status_message: job.status_message.clone(),
            observations: job.observations[start..end].to_vec(),
            next_token: (end < job.observations.len()).then(|| end.to_string()),
        })
    }
}

// --- HARNESS ---

/// An `AppState` wired to in-memory services, with handles to inspect them.
pub struct TestHarness {
    pub queue: Arc<InMemoryQueue>,
    pub storage: Arc<InMemoryBlobStore>,
    pub detector: Arc<FakeDetector>,
    state: AppState,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_source(FakeVideoSource::chunks(vec![b"video-bytes".to_vec()]))
    }

    pub fn with_source(source: FakeVideoSource) -> Self {
        let store = Arc::new(InMemoryTaskStore::default());
        let queue = Arc::new(InMemoryQueue::default());
        let storage = Arc::new(InMemoryBlobStore::default());
        let detector = Arc::new(FakeDetector::default());

        let state = AppState::new(
            test_config(),
            DedupCache::new(store),
            queue.clone(),
            storage.clone(),
            Arc::new(source),
            detector.clone(),
        );

        Self {
            queue,
            storage,
            detector,
            state,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }
}
