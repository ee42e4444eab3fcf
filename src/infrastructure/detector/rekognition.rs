use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::{Client, config::Region, config::Credentials, config::BehaviorVersion};
use aws_sdk_rekognition::config::Builder;
use aws_sdk_rekognition::types::{self as sdk, LabelDetectionSortBy, S3Object, Video};
use tracing::{debug, info};

use crate::config::settings::AppConfig;
use crate::infrastructure::ports::{LabelDetector, LabelPage};
use crate::modules::analysis::model::{
    BoundingBox, DetectedLabel, JobStatus, LabelInstance, LabelName, RawLabelObservation,
};

// Largest page GetLabelDetection hands out
const MAX_RESULTS_PER_PAGE: i32 = 1000;

#[derive(Clone)]
pub struct RekognitionService {
    client: Client,
    min_confidence: Option<f32>,
}

impl RekognitionService {
    pub fn new(config: &AppConfig) -> Self {
        let credentials = Credentials::new(
            &config.aws_access_key,
            &config.aws_secret_key,
            None,
            None,
            "static",
        );

        let conf = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .credentials_provider(credentials)
            .build();

        info!("✅ Rekognition client ready in {}", config.aws_region);

        Self {
            client: Client::from_conf(conf),
            min_confidence: config.detector_min_confidence,
        }
    }
}

#[async_trait]
impl LabelDetector for RekognitionService {
    async fn start_job(&self, bucket: &str, key: &str, idempotency_token: &str) -> Result<String> {
        let video = Video::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let output = self
            .client
            .start_label_detection()
            .video(video)
            .client_request_token(idempotency_token)
            .set_min_confidence(self.min_confidence)
            .send()
            .await
            .map_err(|e| anyhow!("StartLabelDetection {}/{}: {}", bucket, key, e))?;

        debug!("StartLabelDetection response: {:?}", output);

        output
            .job_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("StartLabelDetection returned no JobId"))
    }

    async fn get_job_status(&self, job_id: &str, next_token: Option<&str>) -> Result<LabelPage> {
        let output = self
            .client
            .get_label_detection()
            .job_id(job_id)
            .max_results(MAX_RESULTS_PER_PAGE)
            .sort_by(LabelDetectionSortBy::Timestamp)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| anyhow!("GetLabelDetection {}: {}", job_id, e))?;

        let status = output
            .job_status()
            .map(|s| JobStatus::from(s.as_str()))
            .unwrap_or(JobStatus::Pending);

        let observations = output
            .labels()
            .iter()
            .filter_map(to_observation)
            .collect();

        Ok(LabelPage {
            status,
            status_message: output.status_message().map(str::to_string),
            observations,
            next_token: output.next_token().map(str::to_string),
        })
    }
}

/// Copies a detection record over field for field. Records without a label
/// name carry nothing to rank and are skipped.
fn to_observation(detection: &sdk::LabelDetection) -> Option<RawLabelObservation> {
    let label = detection.label()?;

    let instances = label
        .instances()
        .iter()
        .map(|instance| LabelInstance {
            bounding_box: instance.bounding_box().map(|b| BoundingBox {
                width: b.width(),
                height: b.height(),
                left: b.left(),
                top: b.top(),
            }),
            confidence: instance.confidence(),
        })
        .collect();

    Some(RawLabelObservation {
        timestamp: detection.timestamp(),
        label: DetectedLabel {
            name: label.name()?.to_string(),
            confidence: label.confidence().unwrap_or_default(),
            instances,
            parents: label.parents().iter().filter_map(|p| label_name(p.name())).collect(),
            aliases: label.aliases().iter().filter_map(|a| label_name(a.name())).collect(),
            categories: label.categories().iter().filter_map(|c| label_name(c.name())).collect(),
        },
    })
}

fn label_name(name: Option<&str>) -> Option<LabelName> {
    name.map(|name| LabelName { name: name.to_string() })
}
