//! The `quest compare` command.

use std::path::PathBuf;

use anyhow::Result;

use quest_core::report::GradeReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    let baseline = GradeReport::load_json(&baseline_path)?;
    let current = GradeReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!(
                "Comparison: {} lowered, {} raised, {} unchanged",
                report.lowered.len(),
                report.raised.len(),
                report.unchanged
            );

            if !report.lowered.is_empty() {
                println!("\nLowered:");
                for c in &report.lowered {
                    println!(
                        "  {} ({}) {:.1}% -> {:.1}% ({:+.1}%)",
                        c.instance_id,
                        c.taker,
                        c.baseline_score * 100.0,
                        c.current_score * 100.0,
                        c.delta * 100.0
                    );
                }
            }

            if !report.raised.is_empty() {
                println!("\nRaised:");
                for c in &report.raised {
                    println!(
                        "  {} ({}) {:.1}% -> {:.1}% (+{:.1}%)",
                        c.instance_id,
                        c.taker,
                        c.baseline_score * 100.0,
                        c.current_score * 100.0,
                        c.delta * 100.0
                    );
                }
            }

            if report.new_instances > 0 {
                println!("\n{} new instance(s)", report.new_instances);
            }
            if report.removed_instances > 0 {
                println!("{} removed instance(s)", report.removed_instances);
            }
        }
    }

    if fail_on_regression && report.has_lowered() {
        std::process::exit(1);
    }

    Ok(())
}
