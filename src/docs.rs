use utoipa::OpenApi;
use crate::modules::analysis::dto::*;
use crate::modules::analysis::model::{AggregatedLabel, JobStatus, RawLabelObservation};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::analysis::handler::analyze_video,
        crate::modules::analysis::handler::get_analysis_results,
    ),
    components(
        schemas(
            AnalyzeVideoRequest, AnalyzeVideoResponse, AnalysisResults, LabelsView,
            AggregatedLabel, RawLabelObservation, JobStatus,
        )
    ),
    tags(
        (name = "Analysis", description = "Video label detection")
    )
)]
pub struct ApiDoc;
