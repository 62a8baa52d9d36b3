//! Question template compiler.
//!
//! Compiles the plain-text template markup into a `CompiledQuestion`, loads
//! template sets from files and directories, and validates them.
//!
//! ```text
//! [[type]]
//! MCQ
//! [[attribs]]
//! Name: Multiplication warm-up
//! Grade: 3
//! [[question]]
//! If a=1, b=2. What is a*b?
//! --
//! & 12
//! ^ 2
//! % None of the above
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::error::TemplateError;
use crate::expression::{inline_expressions, Evaluator};
use crate::model::{
    AnswerOption, Attributes, CompiledQuestion, Distribution, NumericKey, NumericType,
    OptionRole, PrecisionType, QuestionKind, SlotAnswer, TemplateAnswer, VariableSpec,
};
use crate::ordered::OrderedMap;
use crate::randomizer::random_token;

/// Lines starting with this separate templates within one file.
pub const TEMPLATE_SEPARATOR: &str = "#----";

/// Longest auto-generated display name, in characters.
const NAME_LENGTH: usize = 250;

/// Knobs that change what the compiler accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileOptions {
    /// Minimum number of correct options for multi-select; 0 disables the
    /// check.
    pub multi_select_min_keys: usize,
    /// Length of generated option labels.
    pub label_length: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            multi_select_min_keys: 0,
            label_length: 4,
        }
    }
}

struct Patterns {
    section: Regex,
    variable: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, TemplateError> {
        let build = |re: &str| {
            Regex::new(re).map_err(|e| TemplateError::parse(format!("invalid pattern: {e}")))
        };
        Ok(Self {
            section: build(r"^\s*\[\[(\S*)\]\]")?,
            variable: build(r"^\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*:(.*)$")?,
        })
    }
}

/// Split template lines into positional `(name, lines)` sections.
///
/// Lines before the first marker belong to no section and are dropped. A
/// section name seen twice produces two entries; lookups take the last.
fn split_sections<'a>(text: &'a str, section_re: &Regex) -> Vec<(String, Vec<&'a str>)> {
    let mut sections: Vec<(String, Vec<&'a str>)> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = section_re.captures(line) {
            sections.push((caps[1].to_lowercase(), Vec::new()));
        } else if let Some((_, content)) = sections.last_mut() {
            content.push(line);
        }
    }
    sections
}

fn section<'s, 'a>(sections: &'s [(String, Vec<&'a str>)], name: &str) -> Option<&'s [&'a str]> {
    sections
        .iter()
        .rev()
        .find(|(n, _)| n == name)
        .map(|(_, lines)| lines.as_slice())
}

/// Join a block into one line of text, dropping blank lines.
fn join_block(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compile one template with a thread-local random source and default
/// options.
pub fn parse_question_text(text: &str) -> Result<CompiledQuestion, TemplateError> {
    parse_question_text_with(text, &mut rand::thread_rng(), &CompileOptions::default())
}

/// Compile one template. Option labels are drawn from `rng`.
pub fn parse_question_text_with<R: Rng + ?Sized>(
    text: &str,
    rng: &mut R,
    options: &CompileOptions,
) -> Result<CompiledQuestion, TemplateError> {
    let patterns = Patterns::compile()?;
    let sections = split_sections(text, &patterns.section);

    let kind_lines = section(&sections, "type")
        .ok_or_else(|| TemplateError::parse("[[type]] section not given"))?;
    let question_lines = section(&sections, "question")
        .ok_or_else(|| TemplateError::parse("[[question]] section not given"))?;

    let kind: QuestionKind = join_block(kind_lines)
        .parse()
        .map_err(TemplateError::Parse)?;

    let (question_body, solution, answer) = if kind.is_choice() {
        parse_choice(kind, question_lines, rng, options)?
    } else {
        let body = join_block(question_lines);
        let solution = section(&sections, "solution")
            .map(join_block)
            .unwrap_or_default();
        let answer = if kind.uses_slots() {
            let grading = section(&sections, "grading")
                .ok_or_else(|| TemplateError::parse("[[grading]] section not given"))?;
            TemplateAnswer::Slots {
                keys: parse_grading(grading)?,
            }
        } else if kind == QuestionKind::PeerEvaluation {
            TemplateAnswer::Peer
        } else {
            TemplateAnswer::FreeText {
                solution: solution.clone(),
            }
        };
        (body, solution, answer)
    };

    let (attributes, name) = match section(&sections, "attribs") {
        Some(lines) => parse_attributes(lines)?,
        None => (Attributes::default(), None),
    };

    let variables = match section(&sections, "variables") {
        Some(lines) => parse_variables(lines, &patterns.variable)?,
        None => OrderedMap::new(),
    };

    let host_code = section(&sections, "code")
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|code| !code.is_empty());

    let name = name.unwrap_or_else(|| {
        question_body
            .replace(['\n', '\r'], "")
            .chars()
            .take(NAME_LENGTH)
            .collect()
    });

    tracing::debug!(%kind, name = %name, variables = variables.len(), "compiled template");

    Ok(CompiledQuestion {
        kind,
        name,
        question_body,
        solution,
        answer,
        variables,
        attributes,
        host_code,
    })
}

fn option_role(line: &str) -> Option<(OptionRole, &str)> {
    // `%^` must be tested before `%`.
    if let Some(rest) = line.strip_prefix("%^") {
        Some((OptionRole::FinalKey, rest))
    } else if let Some(rest) = line.strip_prefix('%') {
        Some((OptionRole::FinalLure, rest))
    } else if let Some(rest) = line.strip_prefix('^') {
        Some((OptionRole::Key, rest))
    } else {
        line.strip_prefix('&').map(|rest| (OptionRole::Lure, rest))
    }
}

fn parse_choice<R: Rng + ?Sized>(
    kind: QuestionKind,
    lines: &[&str],
    rng: &mut R,
    options: &CompileOptions,
) -> Result<(String, String, TemplateAnswer), TemplateError> {
    let split = lines.iter().position(|l| l.trim() == "--").ok_or_else(|| {
        TemplateError::parse("choice questions need a `--` line between the question and its options")
    })?;
    let body = join_block(&lines[..split]);

    let mut used = HashSet::new();
    let mut choices: Vec<AnswerOption> = Vec::new();
    for line in &lines[split + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        match option_role(line.trim_start()) {
            Some((role, text)) => {
                let mut label = random_token(rng, options.label_length);
                while !used.insert(label.clone()) {
                    label = random_token(rng, options.label_length);
                }
                choices.push(AnswerOption {
                    label,
                    text: text.trim().to_string(),
                    role,
                });
            }
            None => match choices.last_mut() {
                Some(option) => {
                    option.text.push('\n');
                    option.text.push_str(line.trim());
                }
                None => {
                    return Err(TemplateError::parse(format!(
                        "option line does not start with &, ^, % or %^: `{}`",
                        line.trim()
                    )))
                }
            },
        }
    }

    if choices.is_empty() {
        return Err(TemplateError::parse("no options given after the `--` line"));
    }

    let correct = choices.iter().filter(|o| o.role.is_correct()).count();
    if kind.single_key() {
        if correct > 1 {
            return Err(TemplateError::parse(
                "multiple correct answers: only one option can be correct in a TF or MCQ \
                 question; maybe you intended a MULTI question?",
            ));
        }
        if correct == 0 {
            return Err(TemplateError::parse("no correct answer: mark one option with ^ or %^"));
        }
    } else if options.multi_select_min_keys > 0 && correct < options.multi_select_min_keys {
        return Err(TemplateError::parse(format!(
            "multi-select questions require at least {} correct answers, found {correct}",
            options.multi_select_min_keys
        )));
    }

    if kind == QuestionKind::TrueFalse {
        for option in &mut choices {
            option.text = option.text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
    }

    let solution = choice_solution(kind, &choices);
    Ok((body, solution, TemplateAnswer::Choice { options: choices }))
}

fn choice_solution(kind: QuestionKind, options: &[AnswerOption]) -> String {
    if kind.single_key() {
        let key = options
            .iter()
            .find(|o| o.role.is_correct())
            .map(|o| o.text.as_str())
            .unwrap_or_default();
        return format!("The solution is: \"{key}\"");
    }
    let mut lines = vec!["The correct answers are:".to_string()];
    let keys = options.iter().filter(|o| o.role == OptionRole::Key);
    let finals = options.iter().filter(|o| o.role == OptionRole::FinalKey);
    lines.extend(keys.chain(finals).map(|o| format!("*\t{}", o.text)));
    lines.join("\n")
}

/// Parse `slot: answer` lines. Repeated literal entries for one slot
/// accumulate; a numeric entry must be the only one for its slot.
fn parse_grading(lines: &[&str]) -> Result<OrderedMap<SlotAnswer>, TemplateError> {
    let mut keys: OrderedMap<SlotAnswer> = OrderedMap::new();
    for line in lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let (slot, value) = line.split_once(':').ok_or_else(|| {
            TemplateError::parse(format!("grading line must look like `slot: answer`: `{line}`"))
        })?;
        let slot = slot.trim();
        if slot.is_empty() || slot.contains(char::is_whitespace) {
            return Err(TemplateError::parse(format!("invalid slot name in `{line}`")));
        }
        let value = value.trim();

        if value.starts_with('[') && value.ends_with(']') {
            let key = parse_numeric_key(&value[1..value.len() - 1])
                .map_err(|msg| TemplateError::parse(format!("grading for `{slot}`: {msg}")))?;
            if keys.insert(slot, SlotAnswer::Numeric(key)).is_some() {
                return Err(TemplateError::parse(format!(
                    "slot `{slot}` has a numeric key and other answers"
                )));
            }
            continue;
        }

        match keys.get_mut(slot) {
            Some(SlotAnswer::Literals(list)) => list.push(value.to_string()),
            Some(SlotAnswer::Numeric(_)) => {
                return Err(TemplateError::parse(format!(
                    "slot `{slot}` has a numeric key and other answers"
                )))
            }
            None => {
                keys.insert(slot, SlotAnswer::Literals(vec![value.to_string()]));
            }
        }
    }
    if keys.is_empty() {
        return Err(TemplateError::parse("[[grading]] section has no answers"));
    }
    Ok(keys)
}

/// `value, precision, abs|rel`, where `value` may itself contain commas.
fn parse_numeric_key(inner: &str) -> Result<NumericKey, String> {
    let mut parts = inner.rsplitn(3, ',');
    let (Some(kind), Some(precision), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("expected [value, precision, abs|rel]".into());
    };
    let precision_type: PrecisionType = kind.parse()?;
    let precision: f64 = precision
        .trim()
        .parse()
        .map_err(|_| format!("precision is not a number: {}", precision.trim()))?;
    if !precision.is_finite() {
        return Err("precision must be finite".into());
    }
    let value = value.trim();
    if value.is_empty() {
        return Err("missing value".into());
    }
    Ok(NumericKey {
        value: value.to_string(),
        precision,
        precision_type,
    })
}

/// Returns the attributes and the optional `Name:` override.
fn parse_attributes(lines: &[&str]) -> Result<(Attributes, Option<String>), TemplateError> {
    let mut attributes = Attributes::default();
    let mut name = None;
    for line in lines.iter().map(|l| l.trim()) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => name = Some(value.to_string()).filter(|n| !n.is_empty()),
            "Contributor" => attributes.contributor = Some(value.to_string()),
            "Tags" => {
                attributes.tags = value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect();
            }
            "Difficulty" => {
                let d: u32 = value.parse().map_err(|_| {
                    TemplateError::parse(format!("Difficulty must be a whole number: `{value}`"))
                })?;
                attributes.difficulty = d.min(9) as u8;
            }
            "Grade" => {
                let g: f64 = value.parse().map_err(|_| {
                    TemplateError::parse(format!("Grade must be a number: `{value}`"))
                })?;
                if !g.is_finite() || g < 0.0 {
                    return Err(TemplateError::parse(format!(
                        "Grade must be a non-negative number: `{value}`"
                    )));
                }
                attributes.max_grade = g;
            }
            "Feedback" => attributes.allow_feedback = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    Ok((attributes, name))
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn parse_variables(
    lines: &[&str],
    variable_re: &Regex,
) -> Result<OrderedMap<VariableSpec>, TemplateError> {
    let mut variables = OrderedMap::new();
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let caps = variable_re
            .captures(line)
            .ok_or_else(|| TemplateError::variable(line, "expected `name: specification`"))?;
        let spec = parse_variable_spec(caps[2].trim()).map_err(|msg| TemplateError::variable(line, msg))?;
        variables.insert(&caps[1], spec);
    }
    Ok(variables)
}

fn parse_variable_spec(spec: &str) -> Result<VariableSpec, String> {
    if let Some(inner) = spec.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or("choice specification must end with `}`")?;
        let (key, list) = inner
            .split_once(':')
            .ok_or("expected `{choices: [...]}`")?;
        if unquote(key) != "choices" {
            return Err(format!("the only allowed key is `choices`, found `{}`", unquote(key)));
        }
        let list = list.trim();
        let items = list
            .strip_prefix('[')
            .and_then(|l| l.strip_suffix(']'))
            .ok_or("choice specification must have exactly one key, `choices`, holding a [list]")?;
        let choices: Vec<String> = items
            .split(',')
            .map(unquote)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        if choices.is_empty() {
            return Err("`choices` list is empty".into());
        }
        return Ok(VariableSpec::Choice { choices });
    }

    let items: Vec<&str> = spec
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .collect();
    if !(3..=5).contains(&items.len()) {
        return Err(format!(
            "specification list should be 3, 4 or 5 entries long, found {}",
            items.len()
        ));
    }

    let number = |s: &str| -> Result<f64, String> {
        match s.parse::<f64>() {
            Ok(v) if !v.is_nan() => Ok(v),
            _ => Err(format!("`{s}` is not a number")),
        }
    };
    let (low, high, step) = (number(items[0])?, number(items[1])?, number(items[2])?);
    if low > high {
        return Err("[low, high, step]: low must not exceed high".into());
    }
    if step < 0.0 || step > high - low {
        return Err("[low, high, step]: step must lie between 0 and (high - low)".into());
    }

    let numeric_type = match items.get(3).map(|s| unquote(s).to_lowercase()) {
        None => NumericType::Float,
        Some(t) if t == "int" => NumericType::Int,
        Some(t) if t == "float" => NumericType::Float,
        Some(t) => return Err(format!("type must be `int` or `float`, found `{t}`")),
    };
    let distribution = match items.get(4).map(|s| unquote(s).to_lowercase()) {
        None => Distribution::Uniform,
        Some(d) if d == "uniform" => Distribution::Uniform,
        Some(d) if d == "normal" => Distribution::Normal,
        Some(d) => return Err(format!("distribution must be `uniform` or `normal`, found `{d}`")),
    };

    Ok(VariableSpec::Range {
        low,
        high,
        step,
        numeric_type,
        distribution,
    })
}

/// Split a multi-template file at `#----` lines. Empty chunks are dropped.
pub fn split_templates(content: &str) -> Vec<String> {
    let mut chunks = vec![String::new()];
    for line in content.lines() {
        if line.starts_with(TEMPLATE_SEPARATOR) {
            chunks.push(String::new());
        } else if let Some(current) = chunks.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Compile every template in a file.
pub fn load_template_file(path: &Path, options: &CompileOptions) -> Result<Vec<CompiledQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template file: {}", path.display()))?;
    load_template_str(&content, path, options)
}

/// Compile every template in a string (useful for testing).
///
/// Option labels are drawn from a generator seeded with the template text,
/// so recompiling an unchanged file yields the same labels.
pub fn load_template_str(
    content: &str,
    source_path: &Path,
    options: &CompileOptions,
) -> Result<Vec<CompiledQuestion>> {
    split_templates(content)
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut hasher = DefaultHasher::new();
            chunk.hash(&mut hasher);
            let mut rng = StdRng::seed_from_u64(hasher.finish());
            parse_question_text_with(chunk, &mut rng, options).with_context(|| {
                format!("template {} in {} is invalid", i + 1, source_path.display())
            })
        })
        .collect()
}

/// Recursively load all `.qset` template files from a directory.
pub fn load_template_directory(dir: &Path, options: &CompileOptions) -> Result<Vec<CompiledQuestion>> {
    let mut questions = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            questions.extend(load_template_directory(&path, options)?);
        } else if path.extension().is_some_and(|ext| ext == "qset") {
            match load_template_file(&path, options) {
                Ok(found) => questions.extend(found),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(questions)
}

/// Load a single file or a whole directory.
pub fn load_templates(path: &Path, options: &CompileOptions) -> Result<Vec<CompiledQuestion>> {
    if path.is_dir() {
        load_template_directory(path, options)
    } else {
        load_template_file(path, options)
    }
}

/// A warning from template validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// Name of the template (if applicable).
    pub template: Option<String>,
    pub message: String,
}

/// Positions and ids of every `{[slot]}` marker.
pub fn slot_markers(text: &str) -> Vec<(usize, usize, &str)> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find("{[") {
        let start = cursor + open;
        let Some(close) = text[start + 2..].find("]}") else {
            break;
        };
        let end = start + 2 + close + 2;
        found.push((start, end, text[start + 2..end - 2].trim()));
        cursor = end;
    }
    found
}

/// Expressions inside a numeric key value: its `{{ }}` markers if it has
/// any, otherwise the whole value.
pub(crate) fn key_expressions(value: &str) -> Vec<&str> {
    let inline = inline_expressions(value);
    if inline.is_empty() {
        vec![value.trim()]
    } else {
        inline.into_iter().map(|e| e.expression).collect()
    }
}

/// Every piece of text in a question that may hold inline expressions.
fn expression_texts(q: &CompiledQuestion) -> Vec<&str> {
    let mut texts = vec![q.question_body.as_str(), q.solution.as_str()];
    match &q.answer {
        TemplateAnswer::Choice { options } => texts.extend(options.iter().map(|o| o.text.as_str())),
        TemplateAnswer::Slots { keys } => {
            for answer in keys.values() {
                match answer {
                    SlotAnswer::Literals(list) => texts.extend(list.iter().map(String::as_str)),
                    SlotAnswer::Numeric(_) => {}
                }
            }
        }
        TemplateAnswer::FreeText { .. } | TemplateAnswer::Peer => {}
    }
    texts
}

/// Validate one question for common authoring mistakes.
pub fn validate_question(q: &CompiledQuestion, evaluator: &Evaluator) -> Vec<ValidationWarning> {
    let mut messages = Vec::new();
    let mut referenced = BTreeSet::new();

    let mut expressions: Vec<String> = expression_texts(q)
        .into_iter()
        .flat_map(|t| inline_expressions(t).into_iter().map(|e| e.expression.to_string()))
        .collect();
    if let TemplateAnswer::Slots { keys } = &q.answer {
        for answer in keys.values() {
            if let SlotAnswer::Numeric(k) = answer {
                expressions.extend(key_expressions(&k.value).into_iter().map(String::from));
            }
        }
    }

    for expression in &expressions {
        match evaluator.referenced_names(expression) {
            Ok(names) => referenced.extend(names),
            Err(e) => messages.push(format!("expression `{expression}` does not parse: {e}")),
        }
    }

    for name in q.variables.keys() {
        if !referenced.contains(name) {
            messages.push(format!("variable `{name}` is declared but never used"));
        }
    }
    if q.host_code.is_none() {
        for name in &referenced {
            if !q.variables.contains_key(name) {
                messages.push(format!("variable `{name}` is used but never declared"));
            }
        }
    }

    if let TemplateAnswer::Slots { keys } = &q.answer {
        let markers: Vec<&str> = slot_markers(&q.question_body)
            .into_iter()
            .map(|(_, _, id)| id)
            .collect();
        for slot in keys.keys() {
            if !markers.contains(&slot) {
                messages.push(format!("slot `{slot}` has a grading entry but no {{[{slot}]}} marker"));
            }
        }
        for marker in &markers {
            if !keys.contains_key(marker) && q.host_code.is_none() {
                messages.push(format!("slot `{marker}` is referenced but has no grading entry"));
            }
        }
    }

    messages
        .into_iter()
        .map(|message| ValidationWarning {
            template: Some(q.name.clone()),
            message,
        })
        .collect()
}

/// Validate a template set: per-question checks plus duplicate names.
pub fn validate_questions(questions: &[CompiledQuestion], evaluator: &Evaluator) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    for q in questions {
        if !seen.insert(q.name.as_str()) {
            warnings.push(ValidationWarning {
                template: Some(q.name.clone()),
                message: format!("duplicate template name: {}", q.name),
            });
        }
    }

    for q in questions {
        warnings.extend(validate_question(q, evaluator));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MCQ: &str = "[[type]]\nMCQ\n[[question]]\nIf a=1,b=2. What is a*b?\n--\n& 12\n& 1\n^2\n& 4\n";

    fn compile(text: &str) -> Result<CompiledQuestion, TemplateError> {
        parse_question_text_with(text, &mut StdRng::seed_from_u64(1), &CompileOptions::default())
    }

    fn roles(q: &CompiledQuestion) -> Vec<OptionRole> {
        q.options().iter().map(|o| o.role).collect()
    }

    #[test]
    fn compiles_mcq() {
        let q = compile(MCQ).unwrap();
        assert_eq!(q.kind, QuestionKind::MultipleChoice);
        assert_eq!(q.question_body, "If a=1,b=2. What is a*b?");
        assert_eq!(
            roles(&q),
            vec![OptionRole::Lure, OptionRole::Lure, OptionRole::Key, OptionRole::Lure]
        );
        assert_eq!(q.options()[2].text, "2");
        assert_eq!(q.solution, "The solution is: \"2\"");
        assert_eq!(q.name, "If a=1,b=2. What is a*b?");
        assert_eq!(q.attributes, Attributes::default());

        let labels: HashSet<_> = q.options().iter().map(|o| o.label.clone()).collect();
        assert_eq!(labels.len(), 4);
        assert!(labels.iter().all(|l| l.len() == 4));
    }

    #[test]
    fn final_options_and_continuations() {
        let text = "[[type]]\nmulti\n[[question]]\nPick primes\n--\n^ 2\n& 4\n  spanning two lines\n%^ All of the above\n% None\n^3\n";
        let q = compile(text).unwrap();
        assert_eq!(
            roles(&q),
            vec![
                OptionRole::Key,
                OptionRole::Lure,
                OptionRole::FinalKey,
                OptionRole::FinalLure,
                OptionRole::Key
            ]
        );
        assert_eq!(q.options()[1].text, "4\nspanning two lines");
        assert_eq!(
            q.solution,
            "The correct answers are:\n*\t2\n*\t3\n*\tAll of the above"
        );
    }

    #[test]
    fn rejects_multiple_keys_for_single_answer_kinds() {
        for kind in ["MCQ", "TF"] {
            let text = format!("[[type]]\n{kind}\n[[question]]\nQ\n--\n^ yes\n%^ also yes\n");
            let err = compile(&text).unwrap_err();
            assert!(err.to_string().contains("multiple correct answers"), "{err}");
        }
        let err = compile("[[type]]\nmcq\n[[question]]\nQ\n--\n& a\n& b\n").unwrap_err();
        assert!(err.to_string().contains("no correct answer"));
    }

    #[test]
    fn multi_select_min_keys_is_policy() {
        let text = "[[type]]\nmulti\n[[question]]\nQ\n--\n^ a\n& b\n";
        assert!(compile(text).is_ok());
        let strict = CompileOptions {
            multi_select_min_keys: 2,
            ..CompileOptions::default()
        };
        let err = parse_question_text_with(text, &mut StdRng::seed_from_u64(1), &strict).unwrap_err();
        assert!(err.to_string().contains("at least 2"));
    }

    #[test]
    fn missing_sections_and_markers() {
        assert!(matches!(
            compile("[[question]]\nQ\n"),
            Err(TemplateError::Parse(m)) if m.contains("[[type]]")
        ));
        assert!(matches!(
            compile("[[type]]\nmcq\n"),
            Err(TemplateError::Parse(m)) if m.contains("[[question]]")
        ));
        assert!(compile("[[type]]\nmcq\n[[question]]\nQ\n^ a\n").is_err());
        assert!(compile("[[type]]\nmcq\n[[question]]\nQ\n--\nstray text\n^ a\n").is_err());
        assert!(compile("[[type]]\nessay\n[[question]]\nQ\n").is_err());
    }

    #[test]
    fn true_false_options_are_single_line() {
        let q = compile("[[type]]\ntf\n[[question]]\nThe sky is blue\n--\n^ True\n  indeed\n& False\n").unwrap();
        assert_eq!(q.options()[0].text, "True indeed");
    }

    #[test]
    fn sections_are_positional() {
        let text = "preamble\n[[Type]]\nmcq\n[[question]]\nfirst\n--\n^a\n[[question]]\nsecond\n--\n^b\n& c\n";
        let q = compile(text).unwrap();
        assert_eq!(q.question_body, "second");
        assert_eq!(q.options().len(), 2);
    }

    #[test]
    fn attributes_and_name() {
        let text = "[[type]]\nmcq\n[[attribs]]\nName: Warm-up\nContributor: Kevin\nDifficulty: 12\nTags: math, multiplication\nGrade: 3\nFeedback: False\n[[question]]\nQ\n--\n^a\n";
        let q = compile(text).unwrap();
        assert_eq!(q.name, "Warm-up");
        assert_eq!(q.attributes.contributor.as_deref(), Some("Kevin"));
        assert_eq!(q.attributes.difficulty, 9);
        assert_eq!(q.attributes.tags, vec!["math", "multiplication"]);
        assert_eq!(q.attributes.max_grade, 3.0);
        assert!(!q.attributes.allow_feedback);

        let bad = "[[type]]\nmcq\n[[attribs]]\nGrade: lots\n[[question]]\nQ\n--\n^a\n";
        assert!(compile(bad).is_err());
    }

    #[test]
    fn variables_section() {
        let text = "[[type]]\nmcq\n[[question]]\nQ {{a}}\n--\n^a\n[[variables]]\na: [1, 10, 1, int]\nx: [0.5, 2.5, 0.1, float, normal]\nfruit: {choices: [apple, 'pear']}\n\n";
        let q = compile(text).unwrap();
        assert_eq!(q.variables.keys().collect::<Vec<_>>(), vec!["a", "x", "fruit"]);
        assert_eq!(
            q.variables.get("a"),
            Some(&VariableSpec::Range {
                low: 1.0,
                high: 10.0,
                step: 1.0,
                numeric_type: NumericType::Int,
                distribution: Distribution::Uniform
            })
        );
        assert!(matches!(
            q.variables.get("x"),
            Some(VariableSpec::Range { distribution: Distribution::Normal, .. })
        ));
        assert_eq!(
            q.variables.get("fruit"),
            Some(&VariableSpec::Choice {
                choices: vec!["apple".into(), "pear".into()]
            })
        );
    }

    #[test]
    fn bad_variable_specifications() {
        let cases = [
            "a: [1, 2]",
            "a: [1, 2, 3, int, uniform, extra]",
            "a: [5, 1, 1]",
            "a: [1, 5, 10]",
            "a: [1, 5, -1]",
            "a: [one, 5, 1]",
            "a: [1, 5, 1, complex]",
            "a: {options: [x, y]}",
            "a: {choices: []}",
            "9lives: [1, 2, 1]",
        ];
        for line in cases {
            let text = format!("[[type]]\nmcq\n[[question]]\nQ\n--\n^a\n[[variables]]\n{line}\n");
            assert!(
                matches!(compile(&text), Err(TemplateError::BadVariableSpecification { .. })),
                "{line} should be rejected"
            );
        }
    }

    #[test]
    fn short_answer_grading() {
        let text = "[[type]]\nshort\n[[question]]\nThe mean is {[mean]} and the colour\nis {[colour]}.\n[[solution]]\nAdd and divide.\n[[grading]]\nmean: [{{ (a+b)/2 }}, 0.01, rel]\ncolour: red\ncolour: crimson\n";
        let q = compile(text).unwrap();
        assert_eq!(q.question_body, "The mean is {[mean]} and the colour is {[colour]}.");
        assert_eq!(q.solution, "Add and divide.");
        let TemplateAnswer::Slots { keys } = &q.answer else {
            panic!("expected slots");
        };
        assert_eq!(
            keys.get("mean"),
            Some(&SlotAnswer::Numeric(NumericKey {
                value: "{{ (a+b)/2 }}".into(),
                precision: 0.01,
                precision_type: PrecisionType::Relative
            }))
        );
        assert_eq!(
            keys.get("colour"),
            Some(&SlotAnswer::Literals(vec!["red".into(), "crimson".into()]))
        );
    }

    #[test]
    fn numeric_key_value_may_contain_commas() {
        let key = parse_numeric_key("max(a, b), 0.5, abs").unwrap();
        assert_eq!(key.value, "max(a, b)");
        assert_eq!(key.precision, 0.5);
        assert!(parse_numeric_key("1, 2").is_err());
        assert!(parse_numeric_key("1, x, abs").is_err());
        assert!(parse_numeric_key("1, 2, sideways").is_err());
    }

    #[test]
    fn long_and_peer_kinds() {
        let q = compile("[[type]]\nlong\n[[question]]\nDiscuss.\n[[solution]]\nA model answer.\n").unwrap();
        assert_eq!(
            q.answer,
            TemplateAnswer::FreeText {
                solution: "A model answer.".into()
            }
        );
        let q = compile("[[type]]\npeer\n[[question]]\nRate your partner.\n").unwrap();
        assert_eq!(q.answer, TemplateAnswer::Peer);
        assert!(compile("[[type]]\nshort\n[[question]]\nQ {[a]}\n").is_err());
    }

    #[test]
    fn slot_kinds_require_grading() {
        for kind in ["short", "numeric", "fib", "multipart"] {
            let missing = format!("[[type]]\n{kind}\n[[question]]\nQ {{[a]}}\n");
            assert!(compile(&missing).is_err(), "{kind}");

            let given = format!("[[type]]\n{kind}\n[[question]]\nQ {{[a]}}\n[[grading]]\na: 4\n");
            let q = compile(&given).unwrap();
            assert!(q.kind.uses_slots());
            assert!(matches!(q.answer, TemplateAnswer::Slots { .. }), "{kind}");
        }
    }

    #[test]
    fn code_section_is_kept() {
        let q = compile("[[type]]\nnumeric\n[[question]]\nQ {[a]}\n[[grading]]\na: [1, 0.1, abs]\n[[code]]\nreturn 1\n").unwrap();
        assert_eq!(q.host_code.as_deref(), Some("return 1"));
    }

    #[test]
    fn grading_map_round_trip_keeps_roles_and_labels() {
        let q = compile(MCQ).unwrap();
        let json = q.grading_map().to_json().unwrap();
        let back = TemplateAnswer::from(crate::model::GradingMap::from_json(&json).unwrap());
        assert_eq!(back, q.answer);
    }

    #[test]
    fn split_templates_at_separator() {
        let content = format!("{MCQ}#---- second\n{MCQ}#----\n\n");
        let chunks = split_templates(&content);
        assert_eq!(chunks.len(), 2);
        let questions = load_template_str(&content, &PathBuf::from("x.qset"), &CompileOptions::default()).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn recompiling_keeps_labels() {
        let path = PathBuf::from("x.qset");
        let first = load_template_str(MCQ, &path, &CompileOptions::default()).unwrap();
        let second = load_template_str(MCQ, &path, &CompileOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn load_file_reports_template_index() {
        let content = format!("{MCQ}#----\n[[type]]\nmcq\n");
        let err = load_template_str(&content, &PathBuf::from("bad.qset"), &CompileOptions::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("template 2 in bad.qset"));
    }

    #[test]
    fn load_directory_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.qset"), MCQ).unwrap();
        std::fs::write(dir.path().join("bad.qset"), "[[type]]\nmcq\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("more.qset"), MCQ).unwrap();

        let questions = load_template_directory(dir.path(), &CompileOptions::default()).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn validation_warnings() {
        let text = "[[type]]\nshort\n[[question]]\nWhat is {{ a + c }}? {[ans]}\n[[grading]]\nans: [{{a}}, 0.1, abs]\nextra: foo\n[[variables]]\na: [1, 5, 1, int]\nunused: [1, 5, 1]\n";
        let q = compile(text).unwrap();
        let warnings = validate_questions(&[q.clone(), q], &Evaluator::default());
        let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate template name")));
        assert!(messages.iter().any(|m| m.contains("`unused` is declared but never used")));
        assert!(messages.iter().any(|m| m.contains("`c` is used but never declared")));
        assert!(messages.iter().any(|m| m.contains("slot `extra` has a grading entry")));
        assert!(!messages.iter().any(|m| m.contains("`a` is declared")));
    }

    #[test]
    fn slot_marker_positions() {
        let markers = slot_markers("x {[a]} y {[ b ]}");
        assert_eq!(markers, vec![(2, 7, "a"), (10, 17, "b")]);
    }
}
