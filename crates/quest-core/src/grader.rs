//! Auto-grading engine.
//!
//! Grading is a pure function of a rendered instance and a submission. It
//! never fails: malformed input maps to a zero score with a reason code.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::config::GradingPolicy;
use crate::model::{PrecisionType, QuestionKind};
use crate::results::{
    parse_decimal, AcceptedAnswer, AnswerKey, GradeResult, NumericAnswer, ReasonCode,
    RenderedInstance, Submission,
};

/// Grades submissions under a fixed [`GradingPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Grader {
    policy: GradingPolicy,
}

impl Grader {
    pub fn new(policy: GradingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    pub fn grade(&self, instance: &RenderedInstance, submission: &Submission) -> GradeResult {
        let result = match &instance.answer_key {
            AnswerKey::Choice { .. } if instance.kind == QuestionKind::MultiSelect => {
                self.grade_multi_select(instance, submission)
            }
            AnswerKey::Choice { .. } => self.grade_single_choice(instance, submission),
            AnswerKey::Slots { .. } => self.grade_slots(instance, submission),
            AnswerKey::FreeText { .. } => self.grade_free_text(instance, submission),
            // Collected for manual summary; never auto-graded.
            AnswerKey::Peer => GradeResult::new(0.0, []).provisional(),
        };
        tracing::debug!(
            name = %instance.name,
            score = result.score,
            reasons = ?result.reasons,
            "graded submission"
        );
        result
    }

    fn grade_single_choice(&self, instance: &RenderedInstance, submission: &Submission) -> GradeResult {
        let selected = selections(submission);
        if selected.is_empty() {
            return GradeResult::new(0.0, [ReasonCode::NotAnswered]);
        }
        let correct = selected.len() == 1
            && instance
                .options()
                .iter()
                .any(|o| o.role.is_correct() && o.label == selected[0]);
        GradeResult::new(if correct { instance.max_grade } else { 0.0 }, [])
    }

    fn grade_multi_select(&self, instance: &RenderedInstance, submission: &Submission) -> GradeResult {
        let options = instance.options();
        let keys = options.iter().filter(|o| o.role.is_correct()).count();

        let mut selected = selections(submission);
        if keys > 0 && selected.is_empty() && submission_is_blank(submission) {
            return GradeResult::new(0.0, [ReasonCode::NotAnswered]);
        }
        let mut seen = std::collections::HashSet::new();
        selected.retain(|s| seen.insert(*s));

        let (hits, misses) = selected.iter().fold((0usize, 0usize), |(hits, misses), label| {
            let correct = options
                .iter()
                .any(|o| o.role.is_correct() && o.label == *label);
            if correct {
                (hits + 1, misses)
            } else {
                (hits, misses + 1)
            }
        });

        let credit = if keys == 0 {
            if selected.is_empty() {
                instance.max_grade
            } else {
                0.0
            }
        } else if hits == keys {
            instance.max_grade
        } else {
            instance.max_grade * hits as f64 / keys as f64
        };
        let score = credit - self.policy.negative_penalty * misses as f64;

        let reasons = if hits != keys || misses != 0 {
            vec![ReasonCode::NegativeMcq]
        } else {
            vec![]
        };
        GradeResult::new(score, reasons)
    }

    fn grade_slots(&self, instance: &RenderedInstance, submission: &Submission) -> GradeResult {
        let empty = BTreeMap::new();
        let fields = match submission {
            Submission::Fields(fields) => fields,
            _ => &empty,
        };

        let slots = instance.grading_answer.len();
        if slots == 0 {
            return GradeResult::new(instance.max_grade, []);
        }
        let per_slot = instance.max_grade / slots as f64;

        let mut matched = 0usize;
        let mut penalty = 0.0;
        let mut reasons = Vec::new();
        for (token, accepted) in instance.grading_answer.iter() {
            let (correct, reason) = match fields.get(token) {
                None => (false, Some(ReasonCode::NotAnswered)),
                Some(given) => match accepted {
                    AcceptedAnswer::Numeric(key) => compare_numeric(key, given),
                    AcceptedAnswer::Literals(list) => string_match(list, given),
                },
            };

            if correct {
                matched += 1;
                if reason == Some(ReasonCode::SigFigs) {
                    // Never takes a slot below zero.
                    penalty += self.policy.sigfig_penalty.min(per_slot);
                }
            }
            reasons.extend(reason);
        }
        let credit = if matched == slots {
            instance.max_grade
        } else {
            instance.max_grade * matched as f64 / slots as f64
        };
        let score = credit - penalty;
        GradeResult::new(score, reasons)
    }

    /// Provisional credit only: a human is expected to review it.
    fn grade_free_text(&self, instance: &RenderedInstance, submission: &Submission) -> GradeResult {
        let text = match submission {
            Submission::Text(text) => text.trim(),
            _ => "",
        };
        let result = if text.is_empty() {
            GradeResult::new(0.0, [ReasonCode::BlankAnswer])
        } else if text.chars().count() >= self.policy.long_answer_min_chars {
            GradeResult::new(instance.max_grade, [])
        } else {
            GradeResult::new(0.0, [])
        };
        result.provisional()
    }
}

fn selections(submission: &Submission) -> Vec<&str> {
    match submission {
        Submission::Choice(labels) => labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect(),
        Submission::Text(label) if !label.trim().is_empty() => vec![label.trim()],
        _ => vec![],
    }
}

fn submission_is_blank(submission: &Submission) -> bool {
    match submission {
        Submission::Choice(labels) => labels.iter().all(|l| l.trim().is_empty()),
        Submission::Blank => true,
        _ => false,
    }
}

fn decimal_from_f64(x: f64) -> Option<Decimal> {
    if !x.is_finite() {
        return None;
    }
    let s = x.to_string();
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

/// Compare a typed number against a numeric key.
///
/// Accepted values lie strictly inside `value ± δ`. A correct answer with
/// more decimal places than the key is flagged `SigFigs`.
pub fn compare_numeric(correct: &NumericAnswer, given: &str) -> (bool, Option<ReasonCode>) {
    let cleaned = given.trim().replace('\u{2212}', "-");
    let Some(answer) = parse_decimal(&cleaned) else {
        let reason = if cleaned.is_empty() {
            ReasonCode::BlankAnswer
        } else {
            ReasonCode::NotConvertible
        };
        return (false, Some(reason));
    };

    let inside = match decimal_bounds(correct) {
        Some((lower, upper)) => lower < answer && answer < upper,
        None => {
            // Tolerance outside the decimal range; compare as floats.
            let value = f64::try_from(correct.value).unwrap_or(f64::NAN);
            let delta = match correct.precision_type {
                PrecisionType::Relative => (value * correct.precision).abs(),
                PrecisionType::Absolute => correct.precision.abs(),
            };
            let given = f64::try_from(answer).unwrap_or(f64::NAN);
            value - delta < given && given < value + delta
        }
    };

    if !inside {
        return (false, Some(ReasonCode::WrongValue));
    }
    if answer.scale() > correct.value.scale() {
        return (true, Some(ReasonCode::SigFigs));
    }
    (true, None)
}

fn decimal_bounds(correct: &NumericAnswer) -> Option<(Decimal, Decimal)> {
    let precision = decimal_from_f64(correct.precision)?;
    let delta = match correct.precision_type {
        PrecisionType::Relative => correct.value.checked_mul(precision)?.abs(),
        PrecisionType::Absolute => precision.abs(),
    };
    Some((
        correct.value.checked_sub(delta)?,
        correct.value.checked_add(delta)?,
    ))
}

/// Case-insensitive match against any accepted literal, retried once after
/// trimming and turning hyphens into spaces.
pub fn string_match(accepted: &[String], given: &str) -> (bool, Option<ReasonCode>) {
    let given_lower = given.to_lowercase();
    if accepted.iter().any(|a| a.to_lowercase() == given_lower) {
        return (true, None);
    }

    let normalize = |s: &str| s.trim().replace('-', " ").to_lowercase();
    let given_norm = normalize(given);
    if accepted.iter().any(|a| normalize(a) == given_norm) {
        return (true, None);
    }
    (false, Some(ReasonCode::NoMatch))
}
