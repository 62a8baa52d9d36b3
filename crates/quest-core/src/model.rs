//! Template-side data model.
//!
//! A `CompiledQuestion` is the immutable result of compiling authored
//! template text. It is rendered into a `RenderedInstance` (see `results`)
//! once per test-taker.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ordered::OrderedMap;

/// Which parser and grader strategy applies to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    TrueFalse,
    MultipleChoice,
    MultiSelect,
    ShortAnswer,
    LongAnswer,
    Numeric,
    FillInBlank,
    Multipart,
    PeerEvaluation,
}

impl QuestionKind {
    /// True/false, multiple choice and multi-select questions.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            QuestionKind::TrueFalse | QuestionKind::MultipleChoice | QuestionKind::MultiSelect
        )
    }

    /// Kinds graded slot-by-slot with the numeric/string comparators.
    pub fn uses_slots(self) -> bool {
        matches!(
            self,
            QuestionKind::ShortAnswer
                | QuestionKind::Numeric
                | QuestionKind::FillInBlank
                | QuestionKind::Multipart
        )
    }

    /// Kinds that allow exactly one correct option.
    pub fn single_key(self) -> bool {
        matches!(self, QuestionKind::TrueFalse | QuestionKind::MultipleChoice)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionKind::TrueFalse => "tf",
            QuestionKind::MultipleChoice => "mcq",
            QuestionKind::MultiSelect => "multi",
            QuestionKind::ShortAnswer => "short",
            QuestionKind::LongAnswer => "long",
            QuestionKind::Numeric => "numeric",
            QuestionKind::FillInBlank => "fib",
            QuestionKind::Multipart => "multipart",
            QuestionKind::PeerEvaluation => "peer",
        };
        f.write_str(s)
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tf" | "truefalse" => Ok(QuestionKind::TrueFalse),
            "mcq" | "multiplechoice" => Ok(QuestionKind::MultipleChoice),
            "multi" | "multiselect" => Ok(QuestionKind::MultiSelect),
            "short" | "shortanswer" => Ok(QuestionKind::ShortAnswer),
            "long" | "longanswer" => Ok(QuestionKind::LongAnswer),
            "numeric" => Ok(QuestionKind::Numeric),
            "fib" | "fillinblank" => Ok(QuestionKind::FillInBlank),
            "multipart" => Ok(QuestionKind::Multipart),
            "peer" | "peerevaluation" => Ok(QuestionKind::PeerEvaluation),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Grading role of a choice option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionRole {
    Key,
    Lure,
    FinalKey,
    FinalLure,
}

impl OptionRole {
    pub fn is_correct(self) -> bool {
        matches!(self, OptionRole::Key | OptionRole::FinalKey)
    }

    /// Final options are always displayed last.
    pub fn is_final(self) -> bool {
        matches!(self, OptionRole::FinalKey | OptionRole::FinalLure)
    }
}

/// One labeled option of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Opaque identifier, unique within the question.
    pub label: String,
    /// Display text; may contain inline expressions.
    pub text: String,
    pub role: OptionRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Int,
    #[default]
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    #[default]
    Uniform,
    Normal,
}

/// How a declared variable is drawn for each instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableSpec {
    /// `[low, high, step, type?, distribution?]`, with `low <= high` and
    /// `0 <= step <= high - low`.
    Range {
        low: f64,
        high: f64,
        step: f64,
        #[serde(default, rename = "type")]
        numeric_type: NumericType,
        #[serde(default)]
        distribution: Distribution,
    },
    /// `{choices: [...]}`
    Choice { choices: Vec<String> },
}

/// Tolerance interpretation for numeric answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionType {
    #[serde(rename = "abs", alias = "absolute")]
    Absolute,
    #[serde(rename = "rel", alias = "relative")]
    Relative,
}

impl FromStr for PrecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches(|c| c == '"' || c == '\'').to_lowercase().as_str() {
            "abs" | "absolute" => Ok(PrecisionType::Absolute),
            "rel" | "relative" => Ok(PrecisionType::Relative),
            other => Err(format!("unknown precision type: {other}")),
        }
    }
}

/// A numeric answer key as authored: `[value, precision, precision_type]`.
///
/// `value` is either a literal number or an expression over the question's
/// variables; it is fixed to a decimal once, at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(String, f64, PrecisionType)",
    into = "(String, f64, PrecisionType)"
)]
pub struct NumericKey {
    pub value: String,
    pub precision: f64,
    pub precision_type: PrecisionType,
}

impl From<(String, f64, PrecisionType)> for NumericKey {
    fn from((value, precision, precision_type): (String, f64, PrecisionType)) -> Self {
        Self {
            value,
            precision,
            precision_type,
        }
    }
}

impl From<NumericKey> for (String, f64, PrecisionType) {
    fn from(k: NumericKey) -> Self {
        (k.value, k.precision, k.precision_type)
    }
}

/// Accepted answers for one slot, as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotAnswer {
    Numeric(NumericKey),
    Literals(Vec<String>),
}

/// Template attributes from the `[[attribs]]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default)]
    pub contributor: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default = "default_max_grade")]
    pub max_grade: f64,
    #[serde(default = "default_true")]
    pub allow_feedback: bool,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            contributor: None,
            tags: Vec::new(),
            difficulty: default_difficulty(),
            max_grade: default_max_grade(),
            allow_feedback: true,
        }
    }
}

fn default_difficulty() -> u8 {
    1
}

fn default_max_grade() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// The answer-key structure of a template, one shape per kind family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TemplateAnswer {
    /// Choice kinds, in authoring order.
    Choice { options: Vec<AnswerOption> },
    /// Slot kinds: ordered `(slot_id, accepted answers)`.
    Slots { keys: OrderedMap<SlotAnswer> },
    /// Long answers: free-text model solution.
    FreeText { solution: String },
    /// Peer evaluation: nothing to grade against.
    Peer,
}

/// The textual grading-map interchange format.
///
/// Choice entries serialize as `label: [role, text]`, slot entries as
/// `slot: [value, precision, precision_type]` or `slot: [literal, ...]`.
/// The `kind` tag keeps the two shapes apart when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum GradingMap {
    Choice(OrderedMap<(OptionRole, String)>),
    Slots(OrderedMap<SlotAnswer>),
    FreeText(String),
    Peer,
}

impl GradingMap {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

impl From<&TemplateAnswer> for GradingMap {
    fn from(answer: &TemplateAnswer) -> Self {
        match answer {
            TemplateAnswer::Choice { options } => GradingMap::Choice(
                options
                    .iter()
                    .map(|o| (o.label.clone(), (o.role, o.text.clone())))
                    .collect(),
            ),
            TemplateAnswer::Slots { keys } => GradingMap::Slots(keys.clone()),
            TemplateAnswer::FreeText { solution } => GradingMap::FreeText(solution.clone()),
            TemplateAnswer::Peer => GradingMap::Peer,
        }
    }
}

impl From<GradingMap> for TemplateAnswer {
    fn from(map: GradingMap) -> Self {
        match map {
            GradingMap::Choice(entries) => TemplateAnswer::Choice {
                options: entries
                    .into_iter()
                    .map(|(label, (role, text))| AnswerOption { label, text, role })
                    .collect(),
            },
            GradingMap::Slots(keys) => TemplateAnswer::Slots { keys },
            GradingMap::FreeText(solution) => TemplateAnswer::FreeText { solution },
            GradingMap::Peer => TemplateAnswer::Peer,
        }
    }
}

/// A concrete variable value for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// Variable name to resolved value.
pub type Bindings = BTreeMap<String, Value>;

/// The immutable result of compiling one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuestion {
    pub kind: QuestionKind,
    /// Display name; defaults to the start of the question body.
    pub name: String,
    /// Question text with slot markers and inline expressions.
    pub question_body: String,
    /// Solution text (authored, or generated for choice kinds).
    #[serde(default)]
    pub solution: String,
    pub answer: TemplateAnswer,
    #[serde(default)]
    pub variables: OrderedMap<VariableSpec>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Optional `[[code]]` block for a caller-supplied host runner.
    #[serde(default)]
    pub host_code: Option<String>,
}

impl CompiledQuestion {
    /// Serialize the answer structure to the canonical grading map.
    pub fn grading_map(&self) -> GradingMap {
        GradingMap::from(&self.answer)
    }

    /// Options of a choice question, in authoring order.
    pub fn options(&self) -> &[AnswerOption] {
        match &self.answer {
            TemplateAnswer::Choice { options } => options,
            _ => &[],
        }
    }
}
