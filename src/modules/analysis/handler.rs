use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use crate::modules::analysis::dto::*;
use crate::modules::analysis::service::AnalysisService;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Submit a video url for label detection
/// Registers the url and queues it; processing happens in the background
#[utoipa::path(
    post,
    path = "/api/v1/videos/{website}/analyze",
    params(
        ("website" = String, Path, description = "Source website tag, e.g. youtube")
    ),
    request_body = AnalyzeVideoRequest,
    responses(
        (status = 202, description = "Video queued", body = ApiResponse<AnalyzeVideoResponse>),
        (status = 200, description = "Video already being processed", body = ApiResponse<AnalyzeVideoResponse>),
        (status = 400, description = "Bad Request"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Analysis"
)]
pub async fn analyze_video(
    State(state): State<AppState>,
    Path(website): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    match AnalysisService::submit_video(state, &website, &body).await {
        Ok(IntakeOutcome::Accepted(res)) => ApiSuccess(
            ApiResponse::success(res, "Video queued for analysis"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Ok(IntakeOutcome::Duplicate(res)) => ApiSuccess(
            ApiResponse::success(res, "Video is already being processed"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Get label detection results
/// `IN_PROGRESS` and `PENDING` are normal answers; poll again later
#[utoipa::path(
    get,
    path = "/api/v1/videos/{website}/results",
    params(
        ("website" = String, Path, description = "Source website tag, e.g. youtube"),
        AnalysisResultsQuery
    ),
    responses(
        (status = 200, description = "Job status and labels", body = ApiResponse<AnalysisResults>),
        (status = 400, description = "Bad Request"),
        (status = 404, description = "No task for url"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Analysis"
)]
pub async fn get_analysis_results(
    State(state): State<AppState>,
    Path(website): Path<String>,
    Query(query): Query<AnalysisResultsQuery>,
) -> impl IntoResponse {
    match AnalysisService::get_results(state, &website, query).await {
        Ok(res) => ApiSuccess(ApiResponse::success(res, "Results retrieved successfully"), StatusCode::OK).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
