use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    RedisUrl,
    RabbitMqUrl,
    TaskQueue,
    VideoCacheBucket,
    S3Endpoint,
    AwsRegion,
    AwsAccessKey,
    AwsSecretKey,
    TaskTtlSecs,
    UploadPartSizeMb,
    SourceReadTimeoutSecs,
    PartUploadTimeoutSecs,
    WorkerConcurrency,
    YtdlBin,
    YtdlFormat,
    DetectorMinConfidence,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::TaskQueue => "VIDEO_TASK_QUEUE",
            EnvKey::VideoCacheBucket => "S3_BUCKET_VIDEO_CACHE",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::AwsRegion => "AWS_REGION",
            EnvKey::AwsAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::AwsSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::TaskTtlSecs => "VIDEO_TASK_TTL_SECS",
            EnvKey::UploadPartSizeMb => "UPLOAD_PART_SIZE_MB",
            EnvKey::SourceReadTimeoutSecs => "SOURCE_READ_TIMEOUT_SECS",
            EnvKey::PartUploadTimeoutSecs => "PART_UPLOAD_TIMEOUT_SECS",
            EnvKey::WorkerConcurrency => "WORKER_CONCURRENCY",
            EnvKey::YtdlBin => "YTDL_BIN",
            EnvKey::YtdlFormat => "YTDL_FORMAT",
            EnvKey::DetectorMinConfidence => "DETECTOR_MIN_CONFIDENCE",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
