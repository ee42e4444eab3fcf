use serde::Deserialize;
use std::time::Duration;
use crate::config::env::{self, EnvKey};

// Multi-part uploads reject non-final parts smaller than 5 MiB.
pub const MIN_PART_SIZE_MB: usize = 5;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub redis_url: String,
    pub rabbitmq_url: String,
    pub task_queue: String,
    pub video_cache_bucket: String,
    pub s3_endpoint: Option<String>,
    pub aws_region: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub task_ttl_secs: u64,
    pub upload_part_size_mb: usize,
    pub source_read_timeout_secs: u64,
    pub part_upload_timeout_secs: u64,
    pub worker_concurrency: usize,
    pub ytdl_bin: String,
    pub ytdl_format: String,
    pub detector_min_confidence: Option<f32>,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            redis_url: env::get(EnvKey::RedisUrl)?,
            rabbitmq_url: env::get(EnvKey::RabbitMqUrl)?,
            task_queue: env::get_or(EnvKey::TaskQueue, "video_analysis_tasks"),
            video_cache_bucket: env::get(EnvKey::VideoCacheBucket)?,
            s3_endpoint: env::get_opt(EnvKey::S3Endpoint),
            aws_region: env::get_or(EnvKey::AwsRegion, "us-east-1"),
            aws_access_key: env::get(EnvKey::AwsAccessKey)?,
            aws_secret_key: env::get(EnvKey::AwsSecretKey)?,
            task_ttl_secs: env::get_parsed(EnvKey::TaskTtlSecs, 7 * 24 * 60 * 60),
            upload_part_size_mb: env::get_parsed(EnvKey::UploadPartSizeMb, 64)
                .max(MIN_PART_SIZE_MB),
            source_read_timeout_secs: env::get_parsed(EnvKey::SourceReadTimeoutSecs, 120),
            part_upload_timeout_secs: env::get_parsed(EnvKey::PartUploadTimeoutSecs, 300),
            worker_concurrency: env::get_parsed(EnvKey::WorkerConcurrency, 4).max(1),
            ytdl_bin: env::get_or(EnvKey::YtdlBin, "yt-dlp"),
            ytdl_format: env::get_or(EnvKey::YtdlFormat, "best[ext=mp4]"),
            detector_min_confidence: env::get_opt(EnvKey::DetectorMinConfidence)
                .and_then(|v| v.parse().ok()),
        })
    }

    pub fn upload_part_size(&self) -> usize {
        self.upload_part_size_mb * 1024 * 1024
    }

    pub fn source_read_timeout(&self) -> Duration {
        Duration::from_secs(self.source_read_timeout_secs)
    }

    pub fn part_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.part_upload_timeout_secs)
    }
}
