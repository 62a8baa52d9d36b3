//! Aggregate statistics over graded jobs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::results::{JobResult, PeerReview, ReasonCode};

/// Letter grade for a percentage, using the bands
/// 50/53/57/60/63/67/70/73/77/80/85/90.
pub fn letter_grade(percent: f64) -> &'static str {
    const BANDS: [(f64, &str); 12] = [
        (90.0, "A+"),
        (85.0, "A"),
        (80.0, "A-"),
        (77.0, "B+"),
        (73.0, "B"),
        (70.0, "B-"),
        (67.0, "C+"),
        (63.0, "C"),
        (60.0, "C-"),
        (57.0, "D+"),
        (53.0, "D"),
        (50.0, "D-"),
    ];
    BANDS
        .iter()
        .find(|(floor, _)| percent >= *floor)
        .map(|(_, letter)| *letter)
        .unwrap_or("F")
}

/// Format a grade for display: `"3/4"`, `"2.5/4"`, or just the maximum when
/// nothing has been graded yet.
pub fn grade_display(actual: Option<f64>, max_grade: f64) -> String {
    fn fmt(value: f64) -> String {
        if (value - value.round()).abs() < 1e-8 {
            format!("{:.0}", value)
        } else {
            format!("{:.1}", value)
        }
    }

    match actual {
        Some(actual) => format!("{}/{}", fmt(actual), fmt(max_grade)),
        None => fmt(max_grade),
    }
}

/// Summary of the peer reviews one piece of work received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Non-empty comments, in submission order.
    pub comments: Vec<String>,
}

/// Aggregate peer ratings. Returns `None` when there are no reviews.
pub fn summarize_peer_reviews<'a>(
    reviews: impl IntoIterator<Item = &'a PeerReview>,
) -> Option<PeerSummary> {
    let mut count = 0usize;
    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut comments = Vec::new();

    for review in reviews {
        count += 1;
        total += review.rating;
        min = min.min(review.rating);
        max = max.max(review.rating);
        let comment = review.comment.trim();
        if !comment.is_empty() {
            comments.push(comment.to_string());
        }
    }

    if count == 0 {
        return None;
    }
    Some(PeerSummary {
        count,
        mean: total / count as f64,
        min,
        max,
        comments,
    })
}

/// Statistics for one question across all takers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question: String,
    pub graded: usize,
    pub mean_score: f64,
    pub mean_percent: f64,
}

/// Aggregate statistics for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeStats {
    /// Number of graded jobs.
    pub graded: usize,
    pub total_score: f64,
    pub total_max: f64,
    pub mean_score: f64,
    /// Total score as a percentage of the total maximum.
    pub mean_percent: f64,
    pub letter: String,
    /// Grades that still need a human look.
    pub provisional: usize,
    /// How often each reason code was attached.
    pub reasons: BTreeMap<ReasonCode, usize>,
    pub per_question: BTreeMap<String, QuestionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerSummary>,
}

impl Default for GradeStats {
    fn default() -> Self {
        Self {
            graded: 0,
            total_score: 0.0,
            total_max: 0.0,
            mean_score: 0.0,
            mean_percent: 0.0,
            letter: letter_grade(0.0).to_string(),
            provisional: 0,
            reasons: BTreeMap::new(),
            per_question: BTreeMap::new(),
            peer: None,
        }
    }
}

/// Compute aggregate statistics from all job results.
pub fn compute_grade_stats(results: &[JobResult]) -> GradeStats {
    if results.is_empty() {
        return GradeStats::default();
    }

    let graded = results.len();
    let total_score: f64 = results.iter().map(|r| r.result.score).sum();
    let total_max: f64 = results.iter().map(|r| r.max_grade).sum();
    let mean_percent = if total_max > 0.0 {
        total_score / total_max * 100.0
    } else {
        0.0
    };

    let mut reasons = BTreeMap::new();
    for reason in results.iter().flat_map(|r| &r.result.reasons) {
        *reasons.entry(*reason).or_insert(0) += 1;
    }

    let mut grouped: BTreeMap<&str, Vec<&JobResult>> = BTreeMap::new();
    for r in results {
        grouped.entry(r.question.as_str()).or_default().push(r);
    }
    let per_question = grouped
        .into_iter()
        .map(|(question, group)| {
            let n = group.len() as f64;
            let stats = QuestionStats {
                question: question.to_string(),
                graded: group.len(),
                mean_score: group.iter().map(|r| r.result.score).sum::<f64>() / n,
                mean_percent: group.iter().map(|r| r.percent()).sum::<f64>() / n,
            };
            (question.to_string(), stats)
        })
        .collect();

    GradeStats {
        graded,
        total_score,
        total_max,
        mean_score: total_score / graded as f64,
        mean_percent,
        letter: letter_grade(mean_percent).to_string(),
        provisional: results.iter().filter(|r| !r.result.approved).count(),
        reasons,
        per_question,
        peer: summarize_peer_reviews(results.iter().filter_map(|r| r.review.as_ref())),
    }
}
