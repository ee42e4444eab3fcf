//! Reduces the detector's per-frame labels into a ranked summary.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::dto::{AnalysisResults, LabelsView};
use super::model::{AggregatedLabel, JobStatus, RawLabelObservation};
use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::ports::LabelDetector;

/// Running per-label totals. Labels are grouped by exact name; the average
/// is refreshed on every fold so it is exact for any prefix of the input.
#[derive(Debug, Default)]
pub struct LabelTally {
    index: HashMap<String, usize>,
    groups: Vec<AggregatedLabel>,
}

impl LabelTally {
    pub fn fold(&mut self, observation: &RawLabelObservation) {
        match self.index.get(observation.label_name()) {
            Some(&i) => {
                let group = &mut self.groups[i];
                group.count += 1;
                group.total_confidence += observation.confidence();
                group.average_confidence = group.total_confidence / group.count as f64;
            }
            None => {
                self.index
                    .insert(observation.label_name().to_string(), self.groups.len());
                self.groups.push(AggregatedLabel {
                    label: observation.label_name().to_string(),
                    count: 1,
                    total_confidence: observation.confidence(),
                    average_confidence: observation.confidence(),
                });
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&AggregatedLabel> {
        self.index.get(label).map(|&i| &self.groups[i])
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Groups by descending total confidence, cut to `limit` when given.
    pub fn into_ranked(self, limit: Option<usize>) -> Vec<AggregatedLabel> {
        let mut labels = self.groups;
        labels.sort_by(|a, b| b.total_confidence.total_cmp(&a.total_confidence));
        if let Some(limit) = limit {
            labels.truncate(limit);
        }
        labels
    }
}

pub fn rank_labels<'a>(
    observations: impl IntoIterator<Item = &'a RawLabelObservation>,
    limit: Option<usize>,
) -> Vec<AggregatedLabel> {
    let mut tally = LabelTally::default();
    for observation in observations {
        tally.fold(observation);
    }
    tally.into_ranked(limit)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Top-K cut applied after ranking
    pub count: Option<usize>,
    /// Return the observations untouched
    pub raw: bool,
}

#[derive(Clone)]
pub struct ResultAggregator {
    detector: Arc<dyn LabelDetector>,
}

impl ResultAggregator {
    pub fn new(detector: Arc<dyn LabelDetector>) -> Self {
        Self { detector }
    }

    /// One status check. A job that has not succeeded yet comes back with
    /// its status and no labels; the caller polls again later.
    pub async fn aggregate(&self, job_id: &str, options: AggregateOptions) -> PipelineResult<AnalysisResults> {
        let mut page = self
            .detector
            .get_job_status(job_id, None)
            .await
            .map_err(|e| PipelineError::Detector(e.to_string()))?;

        if page.status != JobStatus::Succeeded {
            debug!("Job {} is {}", job_id, page.status);
            return Ok(AnalysisResults::empty(page.status, page.status_message));
        }

        let status_message = page.status_message.take();
        let mut raw = Vec::new();
        let mut tally = LabelTally::default();
        let mut pages = 1;

        loop {
            if options.raw {
                raw.append(&mut page.observations);
            } else {
                for observation in &page.observations {
                    tally.fold(observation);
                }
            }

            let Some(next_token) = page.next_token.take() else {
                break;
            };

            page = self
                .detector
                .get_job_status(job_id, Some(&next_token))
                .await
                .map_err(|e| PipelineError::Detector(e.to_string()))?;
            pages += 1;
        }

        debug!("Job {}: read {} pages, {} distinct labels", job_id, pages, tally.len());

        let labels = if options.raw {
            LabelsView::Raw(raw)
        } else {
            LabelsView::Aggregated(tally.into_ranked(options.count))
        };

        Ok(AnalysisResults {
            status: JobStatus::Succeeded,
            status_message,
            labels,
        })
    }
}
