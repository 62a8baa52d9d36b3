//! The `quest grade` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use quest_core::config::load_config_from;
use quest_core::grader::Grader;
use quest_core::results::{RenderedInstance, Submission};
use quest_core::statistics::grade_display;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {what} in {}", path.display()))
}

pub fn execute(
    instance_path: PathBuf,
    submission_path: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let instance: RenderedInstance = read_json(&instance_path, "instance")?;
    let submission: Submission = read_json(&submission_path, "submission")?;

    let result = Grader::new(config.grading).grade(&instance, &submission);

    eprintln!(
        "{}: {}{}",
        instance.name,
        grade_display(Some(result.score), instance.max_grade),
        if result.approved { "" } else { " (provisional)" }
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
