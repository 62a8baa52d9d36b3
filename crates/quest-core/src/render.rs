//! Renderer: turns a `CompiledQuestion` into one test-taker's
//! `RenderedInstance`.
//!
//! Rendering is a pure function of the question, the random source and the
//! optional host-code runner. It has no notion of "already rendered".

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::RenderSettings;
use crate::error::RenderError;
use crate::expression::Evaluator;
use crate::model::{AnswerOption, Bindings, CompiledQuestion, NumericKey, SlotAnswer, TemplateAnswer};
use crate::ordered::OrderedMap;
use crate::parser::slot_markers;
use crate::randomizer::{random_token, resolve_variables};
use crate::results::{parse_decimal, AcceptedAnswer, AnswerKey, NumericAnswer, RenderedInstance};
use crate::traits::HostCode;

/// Renders compiled questions.
#[derive(Clone)]
pub struct Renderer {
    evaluator: Evaluator,
    settings: RenderSettings,
    host: Option<Arc<dyn HostCode>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("evaluator", &self.evaluator)
            .field("settings", &self.settings)
            .field("host", &self.host.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Evaluator::default(), RenderSettings::default())
    }
}

impl Renderer {
    pub fn new(evaluator: Evaluator, settings: RenderSettings) -> Self {
        Self {
            evaluator,
            settings,
            host: None,
        }
    }

    /// Attach a runner for templates with a `[[code]]` block.
    pub fn with_host(mut self, host: Arc<dyn HostCode>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render one instance, drawing every random choice from `rng`.
    pub fn render<R: Rng + ?Sized>(
        &self,
        question: &CompiledQuestion,
        rng: &mut R,
    ) -> Result<RenderedInstance, RenderError> {
        let mut bindings = resolve_variables(&question.variables, rng);

        let mut answer = question.answer.clone();
        if let Some(code) = &question.host_code {
            self.run_host(code, &mut bindings, &mut answer)?;
        }

        let (displayed_text, answer_key, grading_answer) = match &answer {
            TemplateAnswer::Choice { options } => {
                let (text, options) = self.render_choices(&question.question_body, options, &bindings, rng)?;
                (text, AnswerKey::Choice { options }, OrderedMap::new())
            }
            TemplateAnswer::Slots { keys } => {
                let (text, tokens, grading) =
                    self.render_slots(&question.question_body, keys, &bindings, rng)?;
                (text, AnswerKey::Slots { tokens }, grading)
            }
            TemplateAnswer::FreeText { solution } => (
                self.evaluator.substitute(&question.question_body, &bindings)?,
                AnswerKey::FreeText {
                    solution: self.evaluator.substitute(solution, &bindings)?,
                },
                OrderedMap::new(),
            ),
            TemplateAnswer::Peer => (
                self.evaluator.substitute(&question.question_body, &bindings)?,
                AnswerKey::Peer,
                OrderedMap::new(),
            ),
        };

        let solution_text = self.evaluator.substitute(&question.solution, &bindings)?;

        tracing::debug!(
            name = %question.name,
            kind = %question.kind,
            inputs = grading_answer.len(),
            "rendered instance"
        );

        Ok(RenderedInstance {
            kind: question.kind,
            name: question.name.clone(),
            max_grade: question.attributes.max_grade,
            variable_bindings: bindings,
            displayed_text,
            solution_text,
            answer_key,
            grading_answer,
            seed: None,
        })
    }

    fn run_host(
        &self,
        code: &str,
        bindings: &mut Bindings,
        answer: &mut TemplateAnswer,
    ) -> Result<(), RenderError> {
        let host = self.host.as_ref().ok_or(RenderError::HostCodeUnavailable)?;
        let output = host
            .run(code, bindings)
            .map_err(|e| RenderError::HostCode(format!("{e:#}")))?;

        bindings.extend(output.variables);
        match answer {
            TemplateAnswer::Slots { keys } => {
                for (slot, value) in output.grading {
                    keys.insert(slot, value);
                }
            }
            _ if !output.grading.is_empty() => {
                tracing::warn!(host = host.name(), "host code returned grading entries for a question without slots; ignoring them");
            }
            _ => {}
        }
        Ok(())
    }

    /// Non-final options shuffled, then final options in authoring order.
    fn render_choices<R: Rng + ?Sized>(
        &self,
        body: &str,
        options: &[AnswerOption],
        bindings: &Bindings,
        rng: &mut R,
    ) -> Result<(String, Vec<AnswerOption>), RenderError> {
        let (mut ordered, finals): (Vec<&AnswerOption>, Vec<&AnswerOption>) =
            options.iter().partition(|o| !o.role.is_final());
        ordered.shuffle(rng);
        ordered.extend(finals);

        let mut displayed = Vec::with_capacity(ordered.len());
        for option in ordered {
            displayed.push(AnswerOption {
                label: option.label.clone(),
                text: self.evaluator.substitute(&option.text, bindings)?,
                role: option.role,
            });
        }

        let mut text = self.evaluator.substitute(body, bindings)?;
        text.push('\n');
        for option in &displayed {
            text.push_str(&format!("\n[option:{}] {}", option.label, option.text));
        }
        Ok((text, displayed))
    }

    /// Replace each `{[slot]}` marker with an input placeholder and pop its
    /// accepted answers into the instance's grading map.
    fn render_slots<R: Rng + ?Sized>(
        &self,
        body: &str,
        keys: &OrderedMap<SlotAnswer>,
        bindings: &Bindings,
        rng: &mut R,
    ) -> Result<(String, OrderedMap<String>, OrderedMap<AcceptedAnswer>), RenderError> {
        let mut remaining = keys.clone();
        let mut tokens = OrderedMap::new();
        let mut grading = OrderedMap::new();
        let mut used = HashSet::new();

        let mut text = String::with_capacity(body.len());
        let mut cursor = 0;
        for (start, end, slot) in slot_markers(body) {
            let answer = remaining
                .remove(slot)
                .ok_or_else(|| RenderError::MissingSlot(slot.to_string()))?;

            let mut token = random_token(rng, self.settings.token_length);
            while !used.insert(token.clone()) {
                token = random_token(rng, self.settings.token_length);
            }

            let accepted = self.resolve_answer(slot, answer, bindings)?;
            text.push_str(&body[cursor..start]);
            text.push_str(&format!("[input:{token}]"));
            cursor = end;

            tokens.insert(token.clone(), slot.to_string());
            grading.insert(token, accepted);
        }
        text.push_str(&body[cursor..]);

        for slot in remaining.keys() {
            tracing::warn!(slot, "grading entry is never referenced in the question text");
        }

        let text = self.evaluator.substitute(&text, bindings)?;
        Ok((text, tokens, grading))
    }

    /// Fix an authored answer to its typed, instance-specific shape.
    fn resolve_answer(
        &self,
        slot: &str,
        answer: SlotAnswer,
        bindings: &Bindings,
    ) -> Result<AcceptedAnswer, RenderError> {
        match answer {
            SlotAnswer::Numeric(key) => Ok(AcceptedAnswer::Numeric(self.resolve_numeric(slot, &key, bindings)?)),
            SlotAnswer::Literals(literals) => literals
                .iter()
                .map(|l| self.evaluator.substitute(l, bindings))
                .collect::<Result<Vec<_>, _>>()
                .map(AcceptedAnswer::Literals),
        }
    }

    fn resolve_numeric(
        &self,
        slot: &str,
        key: &NumericKey,
        bindings: &Bindings,
    ) -> Result<NumericAnswer, RenderError> {
        let raw = key.value.trim();
        // A plain literal keeps its authored precision ("67.10").
        let text = if parse_decimal(raw).is_some() {
            raw.to_string()
        } else if raw.contains("{{") {
            self.evaluator.substitute(raw, bindings)?
        } else {
            self.evaluator
                .evaluate(raw, bindings, None)
                .map_err(|source| RenderError::Evaluation {
                    expression: raw.to_string(),
                    source,
                })?
        };
        let value = parse_decimal(&text).ok_or_else(|| RenderError::InvalidNumericKey {
            slot: slot.to_string(),
            value: text.clone(),
        })?;
        Ok(NumericAnswer {
            value,
            precision: key.precision,
            precision_type: key.precision_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::model::{OptionRole, PrecisionType, QuestionKind, Value};
    use crate::parser::{parse_question_text_with, CompileOptions};
    use crate::traits::{HostOutput, StaticHost};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;
    use std::str::FromStr;

    const MCQ: &str = "[[type]]\nMCQ\n[[question]]\nIf a=1,b=2. What is a*b?\n--\n& 12\n& 1\n^2\n& 4\n";

    fn compile(text: &str) -> CompiledQuestion {
        parse_question_text_with(text, &mut StdRng::seed_from_u64(9), &CompileOptions::default())
            .unwrap()
    }

    #[test]
    fn choice_options_are_shuffled_lures() {
        let q = compile(MCQ);
        let instance = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(4))
            .unwrap();
        let options = instance.options();
        assert_eq!(options.len(), 4);

        let rendered: BTreeSet<_> = options.iter().map(|o| o.label.clone()).collect();
        let authored: BTreeSet<_> = q.options().iter().map(|o| o.label.clone()).collect();
        assert_eq!(rendered, authored);
        assert!(options.iter().any(|o| o.text == "2" && o.role == OptionRole::Key));
        assert_eq!(options.iter().filter(|o| o.role == OptionRole::Lure).count(), 3);
        assert!(instance.displayed_text.starts_with("If a=1,b=2. What is a*b?"));
        for o in options {
            assert!(instance.displayed_text.contains(&format!("[option:{}] {}", o.label, o.text)));
        }
        assert_eq!(instance.solution_text, "The solution is: \"2\"");
    }

    #[test]
    fn final_options_always_last() {
        let q = compile("[[type]]\nmcq\n[[question]]\nQ\n--\n% None of these\n& a\n^ b\n& c\n%^ All of these\n");
        let mut first_orders = HashSet::new();
        for seed in 0..50 {
            let instance = Renderer::default()
                .render(&q, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            let texts: Vec<_> = instance.options().iter().map(|o| o.text.as_str()).collect();
            assert_eq!(&texts[3..], &["None of these", "All of these"]);
            first_orders.insert(texts[..3].join(","));
        }
        assert!(first_orders.len() > 1, "non-final options were never shuffled");
    }

    #[test]
    fn inline_expressions_use_drawn_variables() {
        let q = compile("[[type]]\nmcq\n[[question]]\nWhat is {{a}} times 2?\n--\n^ {{ a*2 }}\n& {{ a*3 }}\n[[variables]]\na: [3, 3, 0, int]\n");
        let instance = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(instance.variable_bindings.get("a"), Some(&Value::Int(3)));
        assert!(instance.displayed_text.starts_with("What is 3 times 2?"));
        let key = instance.options().iter().find(|o| o.role.is_correct()).unwrap();
        assert_eq!(key.text, "6");
        assert_eq!(instance.solution_text, "The solution is: \"6\"");
    }

    #[test]
    fn slots_become_input_tokens() {
        let q = compile("[[type]]\nshort\n[[question]]\nHalf of {{n}} is {[half]}; name a primary colour: {[colour]}\n[[grading]]\nhalf: [n/2, 0.01, abs]\ncolour: red\ncolour: {{ c }}\n[[variables]]\nn: [10, 10, 0, int]\nc: {choices: [blue]}\n");
        let instance = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap();

        assert!(!instance.displayed_text.contains("{["));
        assert!(instance.displayed_text.starts_with("Half of 10 is [input:"));
        assert_eq!(instance.grading_answer.len(), 2);

        let AnswerKey::Slots { tokens } = &instance.answer_key else {
            panic!("expected slot key");
        };
        let slots: Vec<_> = tokens.values().cloned().collect();
        assert_eq!(slots, vec!["half", "colour"]);
        for token in tokens.keys() {
            assert_eq!(token.len(), 8);
            assert!(instance.displayed_text.contains(&format!("[input:{token}]")));
        }

        let mut answers = instance.grading_answer.values();
        match answers.next() {
            Some(AcceptedAnswer::Numeric(n)) => {
                assert_eq!(n.value, Decimal::from_str("5.0").unwrap());
                assert_eq!(n.precision_type, PrecisionType::Absolute);
            }
            other => panic!("expected numeric answer, got {other:?}"),
        }
        assert_eq!(
            answers.next(),
            Some(&AcceptedAnswer::Literals(vec!["red".into(), "blue".into()]))
        );
    }

    #[test]
    fn literal_numeric_key_keeps_precision() {
        let q = compile("[[type]]\nnumeric\n[[question]]\nValue? {[v]}\n[[grading]]\nv: [67.10, 0.3, abs]\n");
        let instance = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap();
        let first = instance.grading_answer.values().next();
        match first {
            Some(AcceptedAnswer::Numeric(n)) => assert_eq!(n.value.scale(), 2),
            other => panic!("expected numeric answer, got {other:?}"),
        }
    }

    #[test]
    fn missing_slot_is_fatal() {
        let q = compile("[[type]]\nshort\n[[question]]\n{[a]} and {[b]}\n[[grading]]\na: x\n");
        let err = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingSlot(ref s) if s == "b"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn value_dependent_failure_is_retryable() {
        let q = compile("[[type]]\nnumeric\n[[question]]\n{[a]}\n[[grading]]\na: [1/x, 0.1, rel]\n[[variables]]\nx: [0, 0, 0, int]\n");
        let err = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Evaluation {
                source: EvalError::DivisionByZero,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn host_code_requires_a_runner() {
        let q = compile("[[type]]\nnumeric\n[[question]]\n{[a]} {[b]}\n[[grading]]\na: [1, 0.1, abs]\n[[code]]\nb = 2 * k\n");
        let err = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap_err();
        assert!(matches!(err, RenderError::HostCodeUnavailable));

        let mut output = HostOutput::default();
        output.variables.insert("k".into(), Value::Int(21));
        output.grading.insert(
            "b",
            SlotAnswer::Numeric(NumericKey {
                value: "2 * k".into(),
                precision: 0.5,
                precision_type: PrecisionType::Absolute,
            }),
        );
        let renderer = Renderer::default().with_host(Arc::new(StaticHost { output }));
        let instance = renderer.render(&q, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(instance.variable_bindings.get("k"), Some(&Value::Int(21)));
        let last = instance.grading_answer.values().last();
        assert!(matches!(last, Some(AcceptedAnswer::Numeric(n)) if n.value == Decimal::from(42)));
    }

    #[test]
    fn same_seed_same_instance() {
        let q = compile("[[type]]\nmulti\n[[question]]\nPick {{ a }}\n--\n^ a\n^ b\n& c\n& d\n[[variables]]\na: [1, 100, 1, int]\n");
        let r = Renderer::default();
        let first = r.render(&q, &mut StdRng::seed_from_u64(77)).unwrap();
        let second = r.render(&q, &mut StdRng::seed_from_u64(77)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.kind, QuestionKind::MultiSelect);
    }

    #[test]
    fn long_answer_solution_is_rendered() {
        let q = compile("[[type]]\nlong\n[[question]]\nExplain {{ 2 + 2 }}.\n[[solution]]\nIt is {{ 2 + 2 }}.\n");
        let instance = Renderer::default()
            .render(&q, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(instance.displayed_text, "Explain 4.");
        assert_eq!(
            instance.answer_key,
            AnswerKey::FreeText {
                solution: "It is 4.".into()
            }
        );
    }
}
