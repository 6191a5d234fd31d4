//! Analysis pipeline and batch orchestrator.
//!
//! [`analyze_assessment`] runs every analyzer over one dataset.
//! [`BatchEngine`] fans a set of datasets out across blocking worker
//! threads, bounded by the configured parallelism, and gathers the results
//! into an [`AnalysisReport`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::certification::{certify_with, CertificationReport};
use crate::config::AnalysisConfig;
use crate::ctt::{compute_ctt, compute_ctt_with_options, CttItemMetrics};
use crate::dif::{detect_dif, DifResult};
use crate::irt::{Calibration, Calibrator};
use crate::model::Dataset;
use crate::reliability::{alpha_if_item_deleted, compute_reliability, ReliabilityResult};
use crate::report::{AnalysisFailure, AnalysisReport};

/// Everything computed for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnalysis {
    pub assessment_id: String,
    pub name: String,
    pub n_students: usize,
    pub n_items: usize,
    pub ctt: Vec<CttItemMetrics>,
    pub reliability: ReliabilityResult,
    /// Cronbach's alpha with each item removed, in item order.
    pub alpha_if_deleted: Vec<f64>,
    pub calibration: Calibration,
    /// `None` when the dataset carries no group labels.
    pub dif: Option<Vec<DifResult>>,
    pub certification: CertificationReport,
    pub duration_ms: u64,
}

impl AssessmentAnalysis {
    /// Number of items flagged for DIF.
    pub fn flagged_count(&self) -> usize {
        self.dif
            .as_ref()
            .map(|results| results.iter().filter(|r| r.flagged).count())
            .unwrap_or(0)
    }
}

/// Run the full analysis pipeline for one dataset.
pub fn analyze_assessment(
    dataset: &Dataset,
    config: &AnalysisConfig,
) -> Result<AssessmentAnalysis> {
    let start = Instant::now();
    let responses = &dataset.responses;
    let span = tracing::debug_span!("analyze", assessment = %dataset.id);
    let _guard = span.enter();

    let ctt = match &dataset.options {
        Some(options) => compute_ctt_with_options(options)
            .with_context(|| format!("option-level CTT failed for '{}'", dataset.id))?,
        None => compute_ctt(responses),
    };

    let reliability = compute_reliability(responses, config.reliability.method);
    let alpha_if_deleted = alpha_if_item_deleted(responses);
    let calibration = Calibrator::new(config.irt.clone()).run(responses);

    let dif = match dataset.groups() {
        Some(groups) => {
            let groups =
                groups.with_context(|| format!("invalid group labels in '{}'", dataset.id))?;
            Some(
                detect_dif(responses, &groups, config.dif.method)
                    .with_context(|| format!("DIF analysis failed for '{}'", dataset.id))?,
            )
        }
        None => None,
    };

    let certification = certify_with(
        &dataset.id,
        responses,
        &calibration.items,
        &reliability,
        dif.as_deref().unwrap_or(&[]),
        &config.certification,
    );

    Ok(AssessmentAnalysis {
        assessment_id: dataset.id.clone(),
        name: dataset.name.clone(),
        n_students: responses.n_students(),
        n_items: responses.n_items(),
        ctt,
        reliability,
        alpha_if_deleted,
        calibration,
        dif,
        certification,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_assessment_start(&self, assessment_id: &str);
    fn on_assessment_complete(&self, analysis: &AssessmentAnalysis);
    fn on_assessment_error(&self, assessment_id: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_assessment_start(&self, _: &str) {}
    fn on_assessment_complete(&self, _: &AssessmentAnalysis) {}
    fn on_assessment_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Runs many assessments concurrently.
pub struct BatchEngine {
    config: Arc<AnalysisConfig>,
}

impl BatchEngine {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze every dataset. Individual failures are recorded in the
    /// report rather than aborting the batch.
    pub async fn run(
        &self,
        datasets: Vec<Dataset>,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisReport> {
        let start = Instant::now();
        let report_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let mut futures = FuturesUnordered::new();

        for dataset in datasets {
            let semaphore = Arc::clone(&semaphore);
            let config = Arc::clone(&self.config);
            let assessment_id = dataset.id.clone();
            progress.on_assessment_start(&assessment_id);

            futures.push(async move {
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    tokio::task::spawn_blocking(move || analyze_assessment(&dataset, &config))
                        .await
                        .context("analysis task panicked")?
                };
                (assessment_id, inner.await)
            });
        }

        let mut assessments = Vec::new();
        let mut failures = Vec::new();
        let total = futures.len();

        while let Some((assessment_id, result)) = futures.next().await {
            match result {
                Ok(analysis) => {
                    progress.on_assessment_complete(&analysis);
                    assessments.push(analysis);
                }
                Err(e) => {
                    tracing::error!("analysis failed for {assessment_id}: {e:#}");
                    progress.on_assessment_error(&assessment_id, &format!("{e:#}"));
                    failures.push(AnalysisFailure {
                        assessment_id,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        // Completion order is nondeterministic.
        assessments.sort_by(|a, b| a.assessment_id.cmp(&b.assessment_id));
        failures.sort_by(|a, b| a.assessment_id.cmp(&b.assessment_id));

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, assessments.len(), failures.len(), elapsed);

        Ok(AnalysisReport {
            id: report_id,
            created_at: chrono::Utc::now(),
            model: self.config.irt.model,
            assessments,
            failures,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}
