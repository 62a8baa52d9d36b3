//! The `quest render` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::Rng;

use quest_core::config::load_config_from;
use quest_core::engine::{render_for_taker, render_for_takers};
use quest_core::expression::Evaluator;
use quest_core::parser;
use quest_core::render::Renderer;

pub fn execute(
    template_path: PathBuf,
    index: usize,
    seed: Option<u64>,
    takers: Vec<String>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let questions = parser::load_template_file(&template_path, &config.compile_options())?;
    let question = questions.get(index).with_context(|| {
        format!(
            "template index {index} out of range: {} has {} template(s)",
            template_path.display(),
            questions.len()
        )
    })?;

    let renderer = Renderer::new(Evaluator::new(config.evaluator), config.render);
    let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());

    let json = if takers.is_empty() {
        let instance = render_for_taker(&renderer, question, seed)
            .with_context(|| format!("failed to render '{}'", question.name))?;
        serde_json::to_string_pretty(&instance)?
    } else {
        let mut instances = BTreeMap::new();
        for (taker, result) in render_for_takers(&renderer, question, &takers, seed) {
            let instance = result
                .with_context(|| format!("failed to render '{}' for {taker}", question.name))?;
            instances.insert(taker, instance);
        }
        serde_json::to_string_pretty(&instances)?
    };

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Instance written to: {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
