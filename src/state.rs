use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::ports::{BlobStore, LabelDetector, TaskQueue, VideoSource};
use crate::modules::analysis::repository::DedupCache;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub cache: DedupCache,
    pub queue: Arc<dyn TaskQueue>,
    pub storage: Arc<dyn BlobStore>,
    pub source: Arc<dyn VideoSource>,
    pub detector: Arc<dyn LabelDetector>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        cache: DedupCache,
        queue: Arc<dyn TaskQueue>,
        storage: Arc<dyn BlobStore>,
        source: Arc<dyn VideoSource>,
        detector: Arc<dyn LabelDetector>,
    ) -> Self {
        Self {
            config,
            cache,
            queue,
            storage,
            source,
            detector,
        }
    }
}
