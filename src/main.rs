use dotenvy::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;
#[cfg(test)]
mod testing;

use crate::config::settings::AppConfig;
use crate::infrastructure::detector::rekognition::RekognitionService;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::source::ytdl::YtDlpSource;
use crate::infrastructure::storage::s3::StorageService;
use crate::modules::analysis::repository::DedupCache;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new()?;

    let redis = RedisService::new(&config.redis_url).await?;
    let prefetch = u16::try_from(config.worker_concurrency).unwrap_or(u16::MAX);
    let queue = RabbitMqService::new(&config.rabbitmq_url, &config.task_queue, prefetch).await?;
    let storage = StorageService::new(&config);
    let detector = RekognitionService::new(&config);
    let source = YtDlpSource::new(&config.ytdl_bin, &config.ytdl_format);

    let state = AppState::new(
        config.clone(),
        DedupCache::new(Arc::new(redis)),
        Arc::new(queue),
        Arc::new(storage),
        Arc::new(source),
        Arc::new(detector),
    );

    tokio::spawn(workers::analyzer::start_analysis_worker(state.clone()));

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
