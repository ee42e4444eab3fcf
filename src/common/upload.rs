use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::ports::{BlobStore, CompletedPart, VideoSource};
use crate::state::AppState;

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Pushes a byte stream into one multi-part upload, one fixed-size part at a
/// time. At most one part plus one incoming chunk is held in memory.
pub struct MultipartUploader<'a> {
    storage: &'a dyn BlobStore,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    part_number: i32,
    part_size: usize,
    part_timeout: Duration,
    buffer: BytesMut,
    bytes_written: u64,
}

impl<'a> MultipartUploader<'a> {
    pub async fn new(
        storage: &'a dyn BlobStore,
        key: String,
        content_type: &str,
        part_size: usize,
        part_timeout: Duration,
    ) -> PipelineResult<Self> {
        let upload_id = timeout(part_timeout, storage.create_multipart_upload(&key, content_type))
            .await
            .map_err(|_| PipelineError::UploadFailed(format!("initiating upload of {} timed out", key)))?
            .map_err(|e| PipelineError::UploadFailed(format!("failed to initiate upload: {}", e)))?;

        Ok(Self {
            storage,
            key,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            part_size,
            part_timeout,
            buffer: BytesMut::with_capacity(part_size),
            bytes_written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> PipelineResult<()> {
        self.bytes_written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        while self.buffer.len() >= self.part_size {
            let body = self.buffer.split_to(self.part_size).freeze();
            self.upload_part(body).await?;
        }

        Ok(())
    }

    async fn upload_part(&mut self, body: Bytes) -> PipelineResult<()> {
        let part_number = self.part_number;

        let part = timeout(
            self.part_timeout,
            self.storage.upload_part(&self.key, &self.upload_id, part_number, body),
        )
        .await
        .map_err(|_| PipelineError::UploadFailed(format!("part {} timed out", part_number)))?
        .map_err(|e| PipelineError::UploadFailed(format!("part {}: {}", part_number, e)))?;

        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    /// Uploads whatever is buffered as the last part and completes the upload.
    pub async fn finish(&mut self) -> PipelineResult<String> {
        if !self.buffer.is_empty() {
            let body = self.buffer.split().freeze();
            self.upload_part(body).await?;
        }

        let parts = std::mem::take(&mut self.parts);
        timeout(
            self.part_timeout,
            self.storage.complete_multipart_upload(&self.key, &self.upload_id, parts),
        )
        .await
        .map_err(|_| PipelineError::UploadFailed(format!("completing {} timed out", self.key)))?
        .map_err(|e| PipelineError::UploadFailed(format!("failed to complete upload: {}", e)))
    }

    /// Drops every uploaded part. Failures are only logged; the caller is
    /// already returning the error that caused the abort.
    pub async fn abort(&self) {
        let aborted = timeout(
            self.part_timeout,
            self.storage.abort_multipart_upload(&self.key, &self.upload_id),
        )
        .await;

        match aborted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to abort upload {} of {}: {}", self.upload_id, self.key, e),
            Err(_) => error!("Aborting upload {} of {} timed out", self.upload_id, self.key),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn parts_uploaded(&self) -> usize {
        self.parts.len()
    }
}

/// Relays a video from its source straight into blob storage.
#[derive(Clone)]
pub struct UploadBridge {
    source: Arc<dyn VideoSource>,
    storage: Arc<dyn BlobStore>,
    part_size: usize,
    read_timeout: Duration,
    part_timeout: Duration,
}

impl UploadBridge {
    pub fn new(
        source: Arc<dyn VideoSource>,
        storage: Arc<dyn BlobStore>,
        part_size: usize,
        read_timeout: Duration,
        part_timeout: Duration,
    ) -> Self {
        Self {
            source,
            storage,
            part_size,
            read_timeout,
            part_timeout,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.source.clone(),
            state.storage.clone(),
            state.config.upload_part_size(),
            state.config.source_read_timeout(),
            state.config.part_upload_timeout(),
        )
    }

    /// Streams `source_url` into `destination_key`. Returns the object
    /// location once the upload is completed; on any failure the upload is
    /// aborted and nothing becomes readable under the key.
    pub async fn bridge(&self, source_url: &str, destination_key: &str) -> PipelineResult<String> {
        let mut stream = timeout(self.read_timeout, self.source.open(source_url))
            .await
            .map_err(|_| PipelineError::SourceUnavailable(format!("opening {} timed out", source_url)))?
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        // The upload is only created once the source has produced data, so
        // unreachable sources never leave an open upload behind.
        let first = self.next_chunk(&mut stream, source_url).await?;
        let Some(first) = first else {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} produced no data",
                source_url
            )));
        };

        let mut uploader = MultipartUploader::new(
            self.storage.as_ref(),
            destination_key.to_string(),
            VIDEO_CONTENT_TYPE,
            self.part_size,
            self.part_timeout,
        )
        .await?;

        let relayed = async {
            uploader.write_chunk(first).await?;
            while let Some(chunk) = self.next_chunk(&mut stream, source_url).await? {
                uploader.write_chunk(chunk).await?;
            }
            uploader.finish().await
        }
        .await;

        match relayed {
            Ok(location) => {
                info!(
                    "Uploaded {} ({} bytes, {} parts) to {}",
                    source_url,
                    uploader.bytes_written(),
                    uploader.parts_uploaded(),
                    location
                );
                Ok(location)
            }
            Err(e) => {
                warn!("Aborting upload of {}: {}", destination_key, e);
                uploader.abort().await;
                Err(e)
            }
        }
    }

    async fn next_chunk(
        &self,
        stream: &mut crate::infrastructure::ports::ByteStream,
        source_url: &str,
    ) -> PipelineResult<Option<Bytes>> {
        loop {
            let item = timeout(self.read_timeout, stream.next())
                .await
                .map_err(|_| {
                    PipelineError::SourceUnavailable(format!(
                        "no data from {} for {:?}",
                        source_url, self.read_timeout
                    ))
                })?;

            match item {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => return Ok(Some(chunk)),
                Some(Err(e)) => {
                    error!("Stream error from {}: {}", source_url, e);
                    return Err(PipelineError::SourceUnavailable(e.to_string()));
                }
                None => return Ok(None),
            }
        }
    }
}
