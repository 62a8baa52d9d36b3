use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use quest_core::engine::render_for_taker;
use quest_core::grader::{compare_numeric, string_match, Grader};
use quest_core::model::PrecisionType;
use quest_core::parser::parse_question_text;
use quest_core::render::Renderer;
use quest_core::results::{NumericAnswer, Submission};
use quest_core::statistics::letter_grade;
use rust_decimal::Decimal;

fn bench_comparators(c: &mut Criterion) {
    let mut group = c.benchmark_group("comparators");

    let key = NumericAnswer {
        value: Decimal::new(671, 1),
        precision: 0.3,
        precision_type: PrecisionType::Absolute,
    };
    group.bench_function("numeric_exact", |b| {
        b.iter(|| compare_numeric(black_box(&key), black_box("67.2")))
    });
    group.bench_function("numeric_sigfigs", |b| {
        b.iter(|| compare_numeric(black_box(&key), black_box("67.14414")))
    });

    let accepted = vec!["photosynthesis".to_string(), "photo-synthesis".to_string()];
    group.bench_function("string_normalized", |b| {
        b.iter(|| string_match(black_box(&accepted), black_box(" Photo Synthesis ")))
    });

    group.bench_function("letter_grade", |b| {
        b.iter(|| letter_grade(black_box(74.5)))
    });

    group.finish();
}

fn bench_grade_instances(c: &mut Criterion) {
    let mut group = c.benchmark_group("grade");
    let grader = Grader::default();
    let renderer = Renderer::default();

    let multi = parse_question_text(
        "[[type]]\nmulti\n[[question]]\nPick the primes.\n--\n^ 2\n^ 3\n^ 5\n& 4\n& 9\n",
    )
    .unwrap();
    let instance = render_for_taker(&renderer, &multi, 1).unwrap();
    let labels: Vec<String> = instance.options().iter().map(|o| o.label.clone()).collect();
    let submission = Submission::Choice(labels);
    group.bench_function("multi_select", |b| {
        b.iter(|| grader.grade(black_box(&instance), black_box(&submission)))
    });

    let slots = parse_question_text(
        "[[type]]\nfib\n[[question]]\n{[a]} {[b]} {[c]}\n[[grading]]\na: [x * 2, 0.01, rel]\nb: red\nb: crimson\nc: [3.14, 0.01, abs]\n[[variables]]\nx: [1, 50, 0.5]\n",
    )
    .unwrap();
    let instance = render_for_taker(&renderer, &slots, 1).unwrap();
    let fields: BTreeMap<String, String> = instance
        .grading_answer
        .keys()
        .map(|token| (token.to_string(), "3.142".to_string()))
        .collect();
    let submission = Submission::Fields(fields);
    group.bench_function("three_slots", |b| {
        b.iter(|| grader.grade(black_box(&instance), black_box(&submission)))
    });

    group.bench_function("render_and_grade", |b| {
        let mut seed = 0u64;
        b.iter(|| {
            seed += 1;
            let instance = render_for_taker(&renderer, &slots, seed).unwrap();
            grader.grade(&instance, &submission)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_comparators, bench_grade_instances);
criterion_main!(benches);
