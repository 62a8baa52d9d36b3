//! Batch orchestration.
//!
//! Generates one instance per test-taker and grades many submissions
//! concurrently with bounded parallelism.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::RenderError;
use crate::grader::Grader;
use crate::model::CompiledQuestion;
use crate::render::Renderer;
use crate::report::GradeReport;
use crate::results::{JobResult, RenderedInstance, Submission};
use crate::statistics::compute_grade_stats;

/// One submission waiting to be graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingJob {
    pub instance_id: String,
    pub taker: String,
    pub instance: RenderedInstance,
    pub submission: Submission,
    /// Jobs already graded in an earlier run are skipped.
    #[serde(default)]
    pub already_graded: bool,
}

/// Load a JSON array of grading jobs.
pub fn load_jobs(path: &Path) -> Result<Vec<GradingJob>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read jobs from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse jobs in {}", path.display()))
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_job_start(&self, instance_id: &str, taker: &str);
    fn on_job_complete(&self, result: &JobResult);
    fn on_job_error(&self, instance_id: &str, taker: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_job_start(&self, _: &str, _: &str) {}
    fn on_job_complete(&self, _: &JobResult) {}
    fn on_job_error(&self, _: &str, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Grades batches of jobs on the tokio runtime.
pub struct BatchGrader {
    grader: Arc<Grader>,
    parallelism: usize,
}

impl BatchGrader {
    pub fn new(grader: Grader, parallelism: usize) -> Self {
        Self {
            grader: Arc::new(grader),
            parallelism: parallelism.max(1),
        }
    }

    /// Grade every pending job. Each instance is graded at most once; jobs
    /// flagged `already_graded` and repeated instance ids are skipped.
    pub async fn grade_batch(
        &self,
        jobs: Vec<GradingJob>,
        progress: &dyn ProgressReporter,
    ) -> Result<GradeReport> {
        let start = Instant::now();
        let report_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));

        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut futures = FuturesUnordered::new();

        for job in jobs {
            if job.already_graded {
                tracing::debug!(instance = %job.instance_id, "already graded, skipping");
                skipped += 1;
                continue;
            }
            if !seen.insert(job.instance_id.clone()) {
                tracing::warn!("instance '{}' appears more than once, skipping duplicate", job.instance_id);
                skipped += 1;
                continue;
            }

            progress.on_job_start(&job.instance_id, &job.taker);
            let grader = Arc::clone(&self.grader);
            let semaphore = Arc::clone(&semaphore);

            futures.push(async move {
                let instance_id = job.instance_id.clone();
                let taker = job.taker.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                    tokio::task::spawn_blocking(move || {
                        let result = grader.grade(&job.instance, &job.submission);
                        let review = match job.submission {
                            Submission::Review(review) => Some(review),
                            _ => None,
                        };
                        JobResult {
                            instance_id: job.instance_id,
                            taker: job.taker,
                            question: job.instance.name,
                            kind: job.instance.kind,
                            max_grade: job.instance.max_grade,
                            result,
                            review,
                        }
                    })
                    .await
                    .context("grading task panicked")
                };
                (instance_id, taker, inner.await)
            });
        }

        let mut results = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let total = futures.len();

        while let Some((instance_id, taker, result)) = futures.next().await {
            match result {
                Ok(job_result) => {
                    progress.on_job_complete(&job_result);
                    results.push(job_result);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("grading failed for {instance_id}/{taker}: {e:#}");
                    progress.on_job_error(&instance_id, &taker, &e.to_string());
                    failed += 1;
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, completed, failed, elapsed);
        tracing::info!(completed, failed, skipped, "batch graded");

        Ok(GradeReport {
            id: report_id,
            created_at: chrono::Utc::now(),
            stats: compute_grade_stats(&results),
            results,
            skipped,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Render one instance from a seed, re-sampling on value-dependent failures
/// up to the renderer's `max_attempts`.
pub fn render_for_taker(
    renderer: &Renderer,
    question: &CompiledQuestion,
    seed: u64,
) -> Result<RenderedInstance, RenderError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let attempts = renderer.settings().max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match renderer.render(question, &mut rng) {
            Ok(mut instance) => {
                instance.seed = Some(seed);
                return Ok(instance);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(question = %question.name, attempt, "re-sampling after: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Render one instance per distinct taker, in roster order.
///
/// The taker at position `i` of the deduplicated roster gets seed
/// `base_seed + i`, so a roster always reproduces the same instances.
pub fn render_for_takers(
    renderer: &Renderer,
    question: &CompiledQuestion,
    takers: &[String],
    base_seed: u64,
) -> Vec<(String, Result<RenderedInstance, RenderError>)> {
    let mut seen = HashSet::new();
    takers
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .enumerate()
        .map(|(i, taker)| {
            let seed = base_seed.wrapping_add(i as u64);
            let result = render_for_taker(renderer, question, seed);
            if let Err(e) = &result {
                tracing::warn!("could not render '{}' for {taker}: {e}", question.name);
            }
            (taker.clone(), result)
        })
        .collect()
}
