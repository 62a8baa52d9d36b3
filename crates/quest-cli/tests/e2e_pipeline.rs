//! End-to-end pipeline tests: compile → render → grade.
//!
//! These tests drive the library the way the CLI does, with perfect,
//! partial and blank submissions.

use std::collections::BTreeMap;
use std::path::Path;

use quest_core::engine::{render_for_taker, render_for_takers};
use quest_core::grader::Grader;
use quest_core::model::{CompiledQuestion, QuestionKind};
use quest_core::parser::{load_template_file, parse_question_text, CompileOptions};
use quest_core::render::Renderer;
use quest_core::results::{
    AcceptedAnswer, AnswerKey, ReasonCode, RenderedInstance, Submission,
};

fn basics() -> Vec<CompiledQuestion> {
    load_template_file(Path::new("../../question-sets/basics.qset"), &CompileOptions::default())
        .unwrap()
}

/// Build the submission a perfect student would give.
fn perfect_submission(instance: &RenderedInstance) -> Submission {
    match &instance.answer_key {
        AnswerKey::Choice { options } => {
            let correct = options
                .iter()
                .filter(|o| o.role.is_correct())
                .map(|o| o.label.clone())
                .collect();
            Submission::Choice(correct)
        }
        AnswerKey::Slots { .. } => {
            let fields: BTreeMap<String, String> = instance
                .grading_answer
                .iter()
                .map(|(token, accepted)| {
                    let answer = match accepted {
                        AcceptedAnswer::Numeric(n) => n.value.to_string(),
                        AcceptedAnswer::Literals(l) => l[0].clone(),
                    };
                    (token.to_string(), answer)
                })
                .collect();
            Submission::Fields(fields)
        }
        AnswerKey::FreeText { solution } => Submission::Text(solution.clone()),
        AnswerKey::Peer => Submission::Blank,
    }
}

#[test]
fn e2e_perfect_submissions_get_full_marks() {
    let renderer = Renderer::default();
    let grader = Grader::default();

    for question in basics() {
        for seed in 0..20 {
            let instance = render_for_taker(&renderer, &question, seed).unwrap();
            let result = grader.grade(&instance, &perfect_submission(&instance));
            assert_eq!(
                result.score, instance.max_grade,
                "{} (seed {seed}) scored {} with reasons {:?}",
                question.name, result.score, result.reasons
            );
            assert!(result.reasons.is_empty(), "{}: {:?}", question.name, result.reasons);
            assert_eq!(result.approved, question.kind != QuestionKind::LongAnswer);
        }
    }
}

#[test]
fn e2e_blank_submissions() {
    let renderer = Renderer::default();
    let grader = Grader::default();

    for question in basics() {
        let instance = render_for_taker(&renderer, &question, 1).unwrap();
        let result = grader.grade(&instance, &Submission::Blank);
        assert_eq!(result.score, 0.0, "{}", question.name);
        let expected = match question.kind {
            QuestionKind::LongAnswer => ReasonCode::BlankAnswer,
            _ => ReasonCode::NotAnswered,
        };
        assert!(result.reasons.contains(&expected), "{}: {:?}", question.name, result.reasons);
    }
}

#[test]
fn e2e_multiplication_mcq() {
    let q = parse_question_text(
        "[[type]]\nMCQ\n[[question]]\nIf a=1,b=2. What is a*b?\n--\n& 12\n& 1\n^2\n& 4\n",
    )
    .unwrap();
    let instance = render_for_taker(&Renderer::default(), &q, 7).unwrap();

    assert_eq!(instance.options().len(), 4);
    let key = instance
        .options()
        .iter()
        .find(|o| o.role.is_correct())
        .unwrap();
    assert_eq!(key.text, "2");
    assert!(instance.displayed_text.starts_with("If a=1,b=2. What is a*b?"));
    assert_eq!(instance.solution_text, "The solution is: \"2\"");

    let result = Grader::default().grade(&instance, &Submission::Choice(vec![key.label.clone()]));
    assert_eq!(result.score, 1.0);
    assert!(result.reasons.is_empty());
}

#[test]
fn e2e_multi_select_partial_credit() {
    let primes = basics()
        .into_iter()
        .find(|q| q.name == "Primes")
        .unwrap();
    let instance = render_for_taker(&Renderer::default(), &primes, 3).unwrap();
    let pick = |text: &str| {
        instance
            .options()
            .iter()
            .find(|o| o.text == text)
            .map(|o| o.label.clone())
            .unwrap()
    };

    // Max 3 over 3 keys: two right, one wrong.
    let submission = Submission::Choice(vec![pick("2"), pick("5"), pick("9")]);
    let result = Grader::default().grade(&instance, &submission);
    assert_eq!(result.score, 1.5);
    assert_eq!(result.reasons, vec![ReasonCode::NegativeMcq]);
}

#[test]
fn e2e_numeric_key_follows_drawn_values() {
    let speed = basics()
        .into_iter()
        .find(|q| q.name == "Average speed")
        .unwrap();
    let instances = render_for_takers(
        &Renderer::default(),
        &speed,
        &["ann".to_string(), "bob".to_string()],
        500,
    );

    for (_, instance) in instances {
        let instance = instance.unwrap();
        let d = instance.variable_bindings["d"].as_f64().unwrap();
        let h = instance.variable_bindings["h"].as_f64().unwrap();
        let (token, _) = instance.grading_answer.iter().next().unwrap();

        let close = format!("{:.2}", d / h * 1.005);
        let far = format!("{:.2}", d / h * 1.5);
        let grader = Grader::default();

        let mut fields = BTreeMap::new();
        fields.insert(token.to_string(), close);
        let ok = grader.grade(&instance, &Submission::Fields(fields.clone()));
        assert!(ok.score > 0.0, "{:?}", ok);

        fields.insert(token.to_string(), far);
        let wrong = grader.grade(&instance, &Submission::Fields(fields));
        assert_eq!(wrong.score, 0.0);
        assert_eq!(wrong.reasons, vec![ReasonCode::WrongValue]);
    }
}

#[test]
fn e2e_short_answer_string_matching() {
    let q = parse_question_text(
        "[[type]]\nshort\n[[question]]\nName the process: {[p]}\n[[grading]]\np: photo-synthesis\np: photosynthesis\n",
    )
    .unwrap();
    let instance = render_for_taker(&Renderer::default(), &q, 0).unwrap();
    let (token, _) = instance.grading_answer.iter().next().unwrap();
    let grader = Grader::default();

    for (given, score) in [("Photosynthesis", 1.0), (" photo synthesis ", 1.0), ("respiration", 0.0)] {
        let mut fields = BTreeMap::new();
        fields.insert(token.to_string(), given.to_string());
        let result = grader.grade(&instance, &Submission::Fields(fields));
        assert_eq!(result.score, score, "{given}");
    }
}
