//! Error types for template compilation, expression evaluation and rendering.
//!
//! Grading has no error type: every submission maps to a `GradeResult`.

use thiserror::Error;

/// Errors raised while compiling an authored template.
///
/// Both variants are fatal to the template: nothing is partially compiled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Structural problem: missing section, malformed option line,
    /// ambiguous correct-answer count.
    #[error("parse error: {0}")]
    Parse(String),

    /// A `[[variables]]` line could not be understood.
    #[error("bad variable specification in `{line}`: {message}")]
    BadVariableSpecification { line: String, message: String },
}

impl TemplateError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        TemplateError::Parse(message.into())
    }

    pub(crate) fn variable(line: &str, message: impl Into<String>) -> Self {
        TemplateError::BadVariableSpecification {
            line: line.trim().to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised by the safe expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("variable `{0}` is not numeric")]
    NonNumeric(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error(
        "the log() function is ambiguous; use ln() for base e or log10() for base 10 logarithms"
    )]
    AmbiguousLog,

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("result is not a finite number")]
    NonFinite,

    #[error("expression too complex: {0}")]
    TooComplex(String),
}

impl EvalError {
    /// Returns `true` for faults that depend on the values drawn for the
    /// variables, so a fresh draw may succeed.
    pub fn depends_on_values(&self) -> bool {
        matches!(
            self,
            EvalError::DivisionByZero | EvalError::InvalidArgument(_) | EvalError::NonFinite
        )
    }
}

/// Errors raised while materializing a compiled question for one test-taker.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An inline or answer-key expression failed to evaluate.
    #[error("failed to evaluate `{expression}`: {source}")]
    Evaluation {
        expression: String,
        #[source]
        source: EvalError,
    },

    /// A `{[slot]}` marker has no entry left in the grading map.
    #[error("slot `{0}` is referenced in the question but has no grading entry")]
    MissingSlot(String),

    /// A numeric answer key did not evaluate to a decimal number.
    #[error("answer key for slot `{slot}` is not a decimal number: {value}")]
    InvalidNumericKey { slot: String, value: String },

    /// The template carries a `[[code]]` block but no host was supplied.
    #[error("template requires host code but no host code runner was provided")]
    HostCodeUnavailable,

    /// The host-code runner failed.
    #[error("host code failed: {0}")]
    HostCode(String),
}

impl RenderError {
    /// Returns `true` if re-sampling the variables and rendering again may
    /// succeed. Template bugs (missing slots, bad keys, absent host) are
    /// permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            RenderError::Evaluation { source, .. } => source.depends_on_values(),
            _ => false,
        }
    }
}
