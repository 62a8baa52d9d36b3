//! Regrade comparison integration tests.
//!
//! Grades the same jobs under two policies, saves both reports as JSON and
//! checks that the comparison finds every changed score.

use quest_core::config::GradingPolicy;
use quest_core::engine::{render_for_taker, BatchGrader, GradingJob, NoopReporter};
use quest_core::grader::Grader;
use quest_core::parser::parse_question_text;
use quest_core::report::GradeReport;
use quest_core::render::Renderer;
use quest_core::results::Submission;

fn multi_select_jobs() -> Vec<GradingJob> {
    let q = parse_question_text(
        "[[type]]\nmulti\n[[question]]\nPick the even numbers.\n--\n^ 2\n^ 4\n& 3\n& 5\n[[attribs]]\nGrade: 2\n",
    )
    .unwrap();
    let instance = render_for_taker(&Renderer::default(), &q, 8).unwrap();
    let label = |text: &str| {
        instance
            .options()
            .iter()
            .find(|o| o.text == text)
            .map(|o| o.label.clone())
            .unwrap()
    };

    let picks = [
        ("ann", vec!["2", "4"]),
        ("bob", vec!["2", "3"]),
        ("cy", vec!["3", "5"]),
    ];
    picks
        .iter()
        .map(|(taker, texts)| GradingJob {
            instance_id: format!("evens-{taker}"),
            taker: taker.to_string(),
            instance: instance.clone(),
            submission: Submission::Choice(texts.iter().map(|t| label(*t)).collect()),
            already_graded: false,
        })
        .collect()
}

async fn grade(policy: GradingPolicy) -> GradeReport {
    BatchGrader::new(Grader::new(policy), 2)
        .grade_batch(multi_select_jobs(), &NoopReporter)
        .await
        .unwrap()
}

#[tokio::test]
async fn harsher_penalty_lowers_partial_answers() {
    let baseline = grade(GradingPolicy::default()).await;
    let current = grade(GradingPolicy {
        negative_penalty: 1.0,
        ..GradingPolicy::default()
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let baseline_path = dir.path().join("baseline.json");
    let current_path = dir.path().join("current.json");
    baseline.save_json(&baseline_path).unwrap();
    current.save_json(&current_path).unwrap();

    let baseline = GradeReport::load_json(&baseline_path).unwrap();
    let current = GradeReport::load_json(&current_path).unwrap();
    let report = current.compare(&baseline, 0.05);

    // ann is perfect in both runs; bob and cy each picked wrong options.
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.lowered.len(), 2);
    assert!(report.raised.is_empty());
    let ids: Vec<&str> = report.lowered.iter().map(|c| c.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["evens-bob", "evens-cy"]);

    // bob: 1 - 0.5 = 0.5 of 2 -> 1 - 1 = 0 of 2.
    assert!((report.lowered[0].delta + 0.25).abs() < 1e-9);

    let md = report.to_markdown();
    assert!(md.contains("2 lowered"));
    assert!(md.contains("evens-cy"));
}

#[tokio::test]
async fn identical_runs_have_no_changes() {
    let a = grade(GradingPolicy::default()).await;
    let b = grade(GradingPolicy::default()).await;
    let report = b.compare(&a, 0.0);
    assert!(!report.has_lowered());
    assert!(report.raised.is_empty());
    assert_eq!(report.unchanged, 3);
    assert_eq!(a.stats, b.stats);
}

#[tokio::test]
async fn added_and_removed_instances() {
    let baseline = grade(GradingPolicy::default()).await;
    let mut jobs = multi_select_jobs();
    jobs.truncate(2);
    jobs[1].instance_id = "evens-late".into();
    let current = BatchGrader::new(Grader::default(), 1)
        .grade_batch(jobs, &NoopReporter)
        .await
        .unwrap();

    let report = current.compare(&baseline, 0.05);
    assert_eq!(report.new_instances, 1);
    assert_eq!(report.removed_instances, 2);
    assert_eq!(report.unchanged, 1);
}
