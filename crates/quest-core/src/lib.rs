//! quest-core: Question templates, randomized rendering and auto-grading.
//!
//! This crate compiles authored question templates, renders one randomized
//! instance per test-taker, evaluates the arithmetic embedded in templates
//! and grades submissions against each instance's answer key.

pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod grader;
pub mod model;
pub mod ordered;
pub mod parser;
pub mod randomizer;
pub mod render;
pub mod report;
pub mod results;
pub mod statistics;
pub mod traits;

pub use config::{load_config, load_config_from, GradingPolicy, QuestConfig, RenderSettings};
pub use error::{EvalError, RenderError, TemplateError};
pub use expression::{EvalLimits, Evaluator};
pub use grader::{compare_numeric, string_match, Grader};
pub use model::{CompiledQuestion, QuestionKind};
pub use parser::{parse_question_text, CompileOptions};
pub use render::Renderer;
pub use results::{GradeResult, ReasonCode, RenderedInstance, Submission};
