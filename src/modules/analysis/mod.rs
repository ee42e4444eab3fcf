use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use crate::state::AppState;

pub mod aggregate;
pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod submitter;

// Intake bodies carry a single url
const MAX_INTAKE_BODY: usize = 64 * 1024;

pub fn router() -> axum::Router<AppState> {
    let intake_routes = Router::new()
        .route("/videos/{website}/analyze", post(handler::analyze_video))
        .layer(RequestBodyLimitLayer::new(MAX_INTAKE_BODY));

    let result_routes = Router::new()
        .route("/videos/{website}/results", get(handler::get_analysis_results));

    intake_routes.merge(result_routes)
}
