//! Grade report types with JSON persistence and regrade comparison.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::results::JobResult;
use crate::statistics::{grade_display, GradeStats};

/// A complete grading report for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Individual job results, in completion order.
    pub results: Vec<JobResult>,
    /// Jobs skipped because they were already graded.
    #[serde(default)]
    pub skipped: usize,
    /// Aggregate statistics.
    pub stats: GradeStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl GradeReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: GradeReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the per-question summary as markdown.
    pub fn to_markdown(&self) -> String {
        let stats = &self.stats;
        let mut md = String::new();

        md.push_str(&format!(
            "**Graded:** {} ({} skipped, {} provisional)\n\n",
            stats.graded, self.skipped, stats.provisional
        ));
        md.push_str(&format!(
            "**Total:** {} ({:.1}%, {})\n\n",
            grade_display(Some(stats.total_score), stats.total_max),
            stats.mean_percent,
            stats.letter
        ));

        if !stats.per_question.is_empty() {
            md.push_str("| Question | Graded | Mean score | Mean % |\n");
            md.push_str("|----------|--------|------------|--------|\n");
            for q in stats.per_question.values() {
                md.push_str(&format!(
                    "| {} | {} | {:.2} | {:.1}% |\n",
                    q.question, q.graded, q.mean_score, q.mean_percent
                ));
            }
            md.push('\n');
        }

        if !stats.reasons.is_empty() {
            md.push_str("### Reasons\n\n");
            for (reason, count) in &stats.reasons {
                md.push_str(&format!("- {reason}: {count}\n"));
            }
        }

        md
    }

    /// Compare this report against a baseline to find instances whose
    /// score moved by more than `threshold` (a fraction of the max grade).
    pub fn compare(&self, baseline: &GradeReport, threshold: f64) -> RegradeReport {
        let score_map = |report: &GradeReport| -> HashMap<String, (String, f64)> {
            report
                .results
                .iter()
                .map(|r| {
                    let fraction = if r.max_grade > 0.0 {
                        r.result.score / r.max_grade
                    } else {
                        0.0
                    };
                    (r.instance_id.clone(), (r.taker.clone(), fraction))
                })
                .collect()
        };

        let baseline_scores = score_map(baseline);
        let current_scores = score_map(self);

        let mut lowered = Vec::new();
        let mut raised = Vec::new();
        let mut unchanged = 0usize;
        let mut new_instances = 0usize;

        for (instance_id, (taker, current)) in &current_scores {
            let Some((_, baseline_score)) = baseline_scores.get(instance_id) else {
                new_instances += 1;
                continue;
            };
            let change = ScoreChange {
                instance_id: instance_id.clone(),
                taker: taker.clone(),
                baseline_score: *baseline_score,
                current_score: *current,
                delta: current - baseline_score,
            };
            if change.delta < -threshold {
                lowered.push(change);
            } else if change.delta > threshold {
                raised.push(change);
            } else {
                unchanged += 1;
            }
        }

        lowered.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        raised.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));

        let removed_instances = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .count();

        RegradeReport {
            lowered,
            raised,
            unchanged,
            new_instances,
            removed_instances,
        }
    }
}

/// Result of comparing two grade reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegradeReport {
    /// Instances whose score went down.
    pub lowered: Vec<ScoreChange>,
    /// Instances whose score went up.
    pub raised: Vec<ScoreChange>,
    /// Instances with no significant change.
    pub unchanged: usize,
    /// Instances in current but not baseline.
    pub new_instances: usize,
    /// Instances in baseline but not current.
    pub removed_instances: usize,
}

/// One instance whose score changed. Scores are fractions of the max grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreChange {
    pub instance_id: String,
    pub taker: String,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
}

impl RegradeReport {
    /// Format the regrade report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} lowered, {} raised, {} unchanged\n\n",
            self.lowered.len(),
            self.raised.len(),
            self.unchanged
        ));

        if !self.lowered.is_empty() {
            md.push_str("### Lowered\n\n");
            md.push_str("| Instance | Taker | Baseline | Current | Delta |\n");
            md.push_str("|----------|-------|----------|---------|-------|\n");
            for c in &self.lowered {
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.1}% | {:.1}% |\n",
                    c.instance_id,
                    c.taker,
                    c.baseline_score * 100.0,
                    c.current_score * 100.0,
                    c.delta * 100.0
                ));
            }
            md.push('\n');
        }

        if !self.raised.is_empty() {
            md.push_str("### Raised\n\n");
            md.push_str("| Instance | Taker | Baseline | Current | Delta |\n");
            md.push_str("|----------|-------|----------|---------|-------|\n");
            for c in &self.raised {
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.1}% | +{:.1}% |\n",
                    c.instance_id,
                    c.taker,
                    c.baseline_score * 100.0,
                    c.current_score * 100.0,
                    c.delta * 100.0
                ));
            }
        }

        md
    }

    /// Returns true if any score went down.
    pub fn has_lowered(&self) -> bool {
        !self.lowered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionKind;
    use crate::results::GradeResult;
    use crate::statistics::compute_grade_stats;

    fn make_report(results: Vec<JobResult>) -> GradeReport {
        GradeReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            stats: compute_grade_stats(&results),
            results,
            skipped: 0,
            duration_ms: 0,
        }
    }

    fn make_job(instance_id: &str, score: f64) -> JobResult {
        JobResult {
            instance_id: instance_id.into(),
            taker: "alice".into(),
            question: "Boiling point".into(),
            kind: QuestionKind::Numeric,
            max_grade: 2.0,
            result: GradeResult::new(score, []),
            review: None,
        }
    }

    #[test]
    fn compare_identical_reports() {
        let baseline = make_report(vec![make_job("i1", 2.0)]);
        let current = make_report(vec![make_job("i1", 2.0)]);

        let report = current.compare(&baseline, 0.05);
        assert!(report.lowered.is_empty());
        assert!(report.raised.is_empty());
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn compare_with_lowered_score() {
        let baseline = make_report(vec![make_job("i1", 2.0)]);
        let current = make_report(vec![make_job("i1", 1.0)]);

        let report = current.compare(&baseline, 0.05);
        assert_eq!(report.lowered.len(), 1);
        assert_eq!(report.lowered[0].delta, -0.5);
        assert!(report.has_lowered());
    }

    #[test]
    fn compare_with_new_and_removed() {
        let baseline = make_report(vec![make_job("old", 1.0)]);
        let current = make_report(vec![make_job("new", 1.0)]);

        let report = current.compare(&baseline, 0.05);
        assert_eq!(report.new_instances, 1);
        assert_eq!(report.removed_instances, 1);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(vec![make_job("i1", 1.5)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        report.save_json(&path).unwrap();
        let loaded = GradeReport::load_json(&path).unwrap();

        assert_eq!(loaded.results, report.results);
        assert_eq!(loaded.stats, report.stats);
    }

    #[test]
    fn markdown_output() {
        let baseline = make_report(vec![make_job("i1", 1.0)]);
        let current = make_report(vec![make_job("i1", 2.0)]);

        let md = current.compare(&baseline, 0.05).to_markdown();
        assert!(md.contains("Raised"));
        assert!(md.contains("i1"));
        assert!(md.contains("+50.0%"));
    }

    #[test]
    fn summary_markdown() {
        let report = make_report(vec![make_job("i1", 1.5), make_job("i2", 2.0)]);
        let md = report.to_markdown();
        assert!(md.contains("**Total:** 3.5/4 (87.5%, A)"));
        assert!(md.contains("| Boiling point | 2 |"));
    }
}
