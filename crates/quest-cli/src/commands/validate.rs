//! The `quest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use quest_core::config::load_config_from;
use quest_core::expression::Evaluator;
use quest_core::parser;

pub fn execute(templates_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let questions = parser::load_templates(&templates_path, &config.compile_options())?;

    println!(
        "Template set: {} ({} templates)",
        templates_path.display(),
        questions.len()
    );
    for q in &questions {
        println!("  [{}] {}", q.kind, q.name);
    }

    let evaluator = Evaluator::new(config.evaluator);
    let warnings = parser::validate_questions(&questions, &evaluator);
    for w in &warnings {
        let prefix = w
            .template
            .as_ref()
            .map(|name| format!("  [{name}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All templates valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
