//! The `quest batch` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use quest_core::config::load_config_from;
use quest_core::engine::{load_jobs, BatchGrader, ProgressReporter};
use quest_core::grader::Grader;
use quest_core::report::GradeReport;
use quest_core::results::JobResult;
use quest_core::statistics::grade_display;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_job_start(&self, instance_id: &str, taker: &str) {
        tracing::debug!("queued {taker} :: {instance_id}");
    }

    fn on_job_complete(&self, result: &JobResult) {
        let reasons: Vec<String> = result.result.reasons.iter().map(|r| r.to_string()).collect();
        eprintln!(
            "  Graded: {} :: {} {}{}{}",
            result.taker,
            result.instance_id,
            grade_display(Some(result.result.score), result.max_grade),
            if reasons.is_empty() {
                String::new()
            } else {
                format!(" [{}]", reasons.join(", "))
            },
            if result.result.approved { "" } else { " (provisional)" },
        );
    }

    fn on_job_error(&self, instance_id: &str, taker: &str, error: &str) {
        eprintln!("  ERROR: {taker} :: {instance_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    jobs_path: PathBuf,
    parallelism: Option<usize>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let parallelism = parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    let jobs = load_jobs(&jobs_path)?;
    eprintln!("quest v{}: grading {} jobs", env!("CARGO_PKG_VERSION"), jobs.len());
    eprintln!();

    let batch = BatchGrader::new(Grader::new(config.grading), parallelism);
    let report = batch.grade_batch(jobs, &ConsoleReporter).await?;

    print_summary(&report);

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    let formats: Vec<&str> = if format == "all" {
        vec!["json", "markdown"]
    } else {
        format.split(',').collect()
    };

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("grades-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "markdown" | "md" => {
                let path = output.join(format!("grades-{timestamp}.md"));
                std::fs::write(&path, report.to_markdown())?;
                eprintln!("Markdown summary: {}", path.display());
            }
            _ => {
                eprintln!("Unknown format: {fmt}");
            }
        }
    }

    Ok(())
}

fn print_summary(report: &GradeReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Question", "Graded", "Mean score", "Mean %"]);

    for q in report.stats.per_question.values() {
        table.add_row(vec![
            Cell::new(&q.question),
            Cell::new(q.graded),
            Cell::new(format!("{:.2}", q.mean_score)),
            Cell::new(format!("{:.1}%", q.mean_percent)),
        ]);
    }

    let stats = &report.stats;
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(stats.graded),
        Cell::new(grade_display(Some(stats.total_score), stats.total_max)),
        Cell::new(format!("{:.1}% ({})", stats.mean_percent, stats.letter)),
    ]);

    eprintln!("\n{table}");
    if stats.provisional > 0 {
        eprintln!("{} provisional grade(s) need review.", stats.provisional);
    }
}
