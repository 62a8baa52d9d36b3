//! Configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::expression::EvalLimits;
use crate::parser::CompileOptions;

/// Scoring knobs for the grader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingPolicy {
    /// Deducted per incorrect multi-select selection.
    pub negative_penalty: f64,
    /// Deducted per over-precise numeric answer.
    pub sigfig_penalty: f64,
    /// Minimum correct options in a multi-select template (0 = no minimum).
    pub multi_select_min_keys: usize,
    /// Long answers shorter than this get no provisional credit.
    pub long_answer_min_chars: usize,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            negative_penalty: 0.5,
            sigfig_penalty: 0.25,
            multi_select_min_keys: 0,
            long_answer_min_chars: 10,
        }
    }
}

/// Rendering knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Render attempts per taker when a draw hits a value-dependent fault.
    pub max_attempts: u32,
    /// Length of input-placeholder tokens.
    pub token_length: usize,
    /// Length of option labels.
    pub label_length: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            token_length: 8,
            label_length: 4,
        }
    }
}

/// Top-level quest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestConfig {
    /// Max concurrent grading jobs.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub grading: GradingPolicy,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub evaluator: EvalLimits,
}

fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./quest-results")
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            grading: GradingPolicy::default(),
            render: RenderSettings::default(),
            evaluator: EvalLimits::default(),
        }
    }
}

impl QuestConfig {
    /// Compiler options derived from the grading and render sections.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            multi_select_min_keys: self.grading.multi_select_min_keys,
            label_length: self.render.label_length,
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quest.toml` in the current directory
/// 2. `~/.config/quest/config.toml`
///
/// Environment variable overrides: `QUEST_PARALLELISM`, `QUEST_OUTPUT_DIR`.
pub fn load_config() -> Result<QuestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quest.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<QuestConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => QuestConfig::default(),
    };

    // Apply env var overrides
    if let Ok(value) = std::env::var("QUEST_PARALLELISM") {
        config.parallelism = value
            .trim()
            .parse()
            .with_context(|| format!("QUEST_PARALLELISM is not a number: {value}"))?;
    }
    if let Ok(dir) = std::env::var("QUEST_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }

    let resolved = resolve_env_vars(&config.output_dir.to_string_lossy());
    config.output_dir = PathBuf::from(resolved);

    if config.parallelism == 0 {
        anyhow::bail!("parallelism must be at least 1");
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_QUEST_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_QUEST_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_QUEST_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_QUEST_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = QuestConfig::default();
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.grading.negative_penalty, 0.5);
        assert_eq!(config.grading.sigfig_penalty, 0.25);
        assert_eq!(config.render.max_attempts, 5);
        assert_eq!(config.evaluator.max_depth, 64);
        assert_eq!(config.compile_options(), CompileOptions::default());
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
parallelism = 8

[grading]
negative_penalty = 0.25
multi_select_min_keys = 2

[evaluator]
max_expression_len = 256
"#;
        let config: QuestConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.grading.negative_penalty, 0.25);
        assert_eq!(config.grading.sigfig_penalty, 0.25);
        assert_eq!(config.compile_options().multi_select_min_keys, 2);
        assert_eq!(config.evaluator.max_expression_len, 256);
        assert_eq!(config.evaluator.max_depth, 64);
        assert_eq!(config.render, RenderSettings::default());
    }

    #[test]
    fn load_explicit_path_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quest.toml");
        let mut config = QuestConfig::default();
        config.output_dir = PathBuf::from("/tmp/${_QUEST_UNSET_FOR_TEST}reports");
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = load_config_from(Some(&path)).unwrap();
        assert_eq!(loaded.output_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(loaded.grading, config.grading);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
