//! Instance-side data model: what a test-taker sees, what they submit and
//! what grading returns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    AnswerOption, Bindings, GradingMap, NumericKey, PrecisionType, QuestionKind, SlotAnswer,
};
use crate::ordered::OrderedMap;

/// A numeric answer key fixed to a decimal for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "(String, f64, PrecisionType)",
    into = "(String, f64, PrecisionType)"
)]
pub struct NumericAnswer {
    pub value: Decimal,
    pub precision: f64,
    pub precision_type: PrecisionType,
}

impl TryFrom<(String, f64, PrecisionType)> for NumericAnswer {
    type Error = String;

    fn try_from(
        (value, precision, precision_type): (String, f64, PrecisionType),
    ) -> Result<Self, Self::Error> {
        let value = parse_decimal(&value).ok_or_else(|| format!("not a decimal number: {value}"))?;
        Ok(Self {
            value,
            precision,
            precision_type,
        })
    }
}

impl From<NumericAnswer> for (String, f64, PrecisionType) {
    fn from(a: NumericAnswer) -> Self {
        (a.value.to_string(), a.precision, a.precision_type)
    }
}

/// Parse a decimal the way submissions are parsed: plain or scientific
/// notation, with a unicode minus sign accepted as `-`.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned = s.trim().replace('\u{2212}', "-");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Accepted answers for one input token of a rendered instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AcceptedAnswer {
    Numeric(NumericAnswer),
    Literals(Vec<String>),
}

impl From<&AcceptedAnswer> for SlotAnswer {
    fn from(a: &AcceptedAnswer) -> Self {
        match a {
            AcceptedAnswer::Numeric(n) => SlotAnswer::Numeric(NumericKey {
                value: n.value.to_string(),
                precision: n.precision,
                precision_type: n.precision_type,
            }),
            AcceptedAnswer::Literals(l) => SlotAnswer::Literals(l.clone()),
        }
    }
}

/// The answer structure specialized to one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum AnswerKey {
    /// Options in the order they were displayed.
    Choice { options: Vec<AnswerOption> },
    /// Input token to the slot id it replaced, in display order.
    Slots { tokens: OrderedMap<String> },
    FreeText { solution: String },
    Peer,
}

/// One materialization of a question for one test-taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedInstance {
    pub kind: QuestionKind,
    pub name: String,
    pub max_grade: f64,
    pub variable_bindings: Bindings,
    pub displayed_text: String,
    pub solution_text: String,
    pub answer_key: AnswerKey,
    /// Input token to accepted answers; empty for non-slot kinds.
    #[serde(default)]
    pub grading_answer: OrderedMap<AcceptedAnswer>,
    /// Seed the instance was rendered with, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RenderedInstance {
    /// Displayed options of a choice question.
    pub fn options(&self) -> &[AnswerOption] {
        match &self.answer_key {
            AnswerKey::Choice { options } => options,
            _ => &[],
        }
    }

    /// Serialize the instance's key to the grading-map interchange format.
    pub fn grading_map(&self) -> GradingMap {
        match &self.answer_key {
            AnswerKey::Choice { options } => GradingMap::Choice(
                options
                    .iter()
                    .map(|o| (o.label.clone(), (o.role, o.text.clone())))
                    .collect(),
            ),
            AnswerKey::Slots { .. } => GradingMap::Slots(
                self.grading_answer
                    .iter()
                    .map(|(token, a)| (token.to_string(), SlotAnswer::from(a)))
                    .collect(),
            ),
            AnswerKey::FreeText { solution } => GradingMap::FreeText(solution.clone()),
            AnswerKey::Peer => GradingMap::Peer,
        }
    }
}

/// Machine-readable explanation attached to a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReasonCode {
    SigFigs,
    #[serde(rename = "NegativeMCQ")]
    NegativeMcq,
    NotAnswered,
    WrongValue,
    NoMatch,
    BlankAnswer,
    NotConvertible,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::SigFigs => "SigFigs",
            ReasonCode::NegativeMcq => "NegativeMCQ",
            ReasonCode::NotAnswered => "NotAnswered",
            ReasonCode::WrongValue => "WrongValue",
            ReasonCode::NoMatch => "NoMatch",
            ReasonCode::BlankAnswer => "BlankAnswer",
            ReasonCode::NotConvertible => "NotConvertible",
        };
        f.write_str(s)
    }
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub score: f64,
    /// Deduplicated, in first-seen order.
    pub reasons: Vec<ReasonCode>,
    /// `false` for provisional grades that need a human look.
    pub approved: bool,
}

impl GradeResult {
    pub fn new(score: f64, reasons: impl IntoIterator<Item = ReasonCode>) -> Self {
        let mut deduped = Vec::new();
        for r in reasons {
            if !deduped.contains(&r) {
                deduped.push(r);
            }
        }
        Self {
            score,
            reasons: deduped,
            approved: true,
        }
    }

    pub fn provisional(mut self) -> Self {
        self.approved = false;
        self
    }
}

/// One peer's rating of another test-taker's work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReview {
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
}

/// A test-taker's raw answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    /// Selected option labels.
    Choice(Vec<String>),
    /// Input token to typed answer.
    Fields(BTreeMap<String, String>),
    Text(String),
    Review(PeerReview),
    Blank,
}

/// Grade for one job of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub instance_id: String,
    pub taker: String,
    /// Question name of the graded instance.
    pub question: String,
    pub kind: QuestionKind,
    pub max_grade: f64,
    pub result: GradeResult,
    /// The submitted peer review, for peer-evaluation jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<PeerReview>,
}

impl JobResult {
    /// Score as a percentage of the instance's maximum.
    pub fn percent(&self) -> f64 {
        if self.max_grade > 0.0 {
            self.result.score / self.max_grade * 100.0
        } else {
            0.0
        }
    }
}
