//! Safe expression evaluator.
//!
//! Expressions are parsed into an AST and interpreted against an explicit
//! function table. Inline expressions are embedded in template text as
//! `{{ expr }}` or `{{ expr | N }}` (N significant figures).

mod eval;
mod format;
mod parser;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, RenderError};
use crate::model::{Bindings, Value};

pub use eval::Number;
pub use parser::Expr;

/// Resource limits for a single expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalLimits {
    /// Longest accepted expression, in characters.
    pub max_expression_len: usize,
    /// Deepest accepted nesting of unary operators and parentheses.
    pub max_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_expression_len: 1024,
            max_depth: 64,
        }
    }
}

/// One `{{ ... }}` occurrence inside a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineExpression<'a> {
    /// Byte range of the whole `{{ ... }}` marker.
    pub start: usize,
    pub end: usize,
    pub expression: &'a str,
    pub sig_figs: Option<usize>,
}

/// Find every inline expression in `text`, left to right.
pub fn inline_expressions(text: &str) -> Vec<InlineExpression<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find("{{") {
        let start = cursor + open;
        let Some(close) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + close + 2;
        let inner = &text[start + 2..end - 2];

        let (expression, sig_figs) = match inner.rsplit_once('|') {
            Some((expr, n)) => match n.trim().trim_end_matches(',').parse::<usize>() {
                Ok(n) => (expr, Some(n)),
                Err(_) => (inner, None),
            },
            None => (inner, None),
        };

        found.push(InlineExpression {
            start,
            end,
            expression: expression.trim(),
            sig_figs,
        });
        cursor = end;
    }
    found
}

/// Evaluates expressions within fixed [`EvalLimits`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    limits: EvalLimits,
}

impl Evaluator {
    pub fn new(limits: EvalLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> EvalLimits {
        self.limits
    }

    pub fn parse(&self, expression: &str) -> Result<Expr, EvalError> {
        parser::parse_expression(
            expression,
            self.limits.max_expression_len,
            self.limits.max_depth,
        )
    }

    /// Evaluate to a number.
    pub fn evaluate_number(
        &self,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<Number, EvalError> {
        let ast = self.parse(expression)?;
        let n = eval::evaluate(&ast, bindings)?;
        if !n.value.is_finite() {
            return Err(EvalError::NonFinite);
        }
        Ok(n)
    }

    /// Evaluate and format the result as a canonical decimal string.
    ///
    /// A bare variable name without a significant-figure count yields the
    /// bound value as-is, so choice variables (`{{ fruit }}`) can be shown.
    pub fn evaluate(
        &self,
        expression: &str,
        bindings: &Bindings,
        sig_figs: Option<usize>,
    ) -> Result<String, EvalError> {
        let ast = self.parse(expression)?;
        if let (Expr::Name(name), None) = (&ast, sig_figs) {
            match bindings.get(name) {
                Some(Value::Int(i)) => return Ok(i.to_string()),
                Some(Value::Text(s)) => return Ok(s.clone()),
                _ => {}
            }
        }
        let n = eval::evaluate(&ast, bindings)?;
        format::format_number(n, sig_figs)
    }

    /// Replace every `{{ expr }}` in `text` with its evaluated value.
    pub fn substitute(&self, text: &str, bindings: &Bindings) -> Result<String, RenderError> {
        let found = inline_expressions(text);
        if found.is_empty() {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for inline in found {
            out.push_str(&text[cursor..inline.start]);
            let value = self
                .evaluate(inline.expression, bindings, inline.sig_figs)
                .map_err(|source| RenderError::Evaluation {
                    expression: inline.expression.to_string(),
                    source,
                })?;
            out.push_str(&value);
            cursor = inline.end;
        }
        out.push_str(&text[cursor..]);
        Ok(out)
    }

    /// Names an expression reads that are neither functions nor constants.
    pub fn referenced_names(&self, expression: &str) -> Result<BTreeSet<String>, EvalError> {
        fn walk(expr: &Expr, names: &mut BTreeSet<String>) {
            match expr {
                Expr::Integer(_) | Expr::Number(_) => {}
                Expr::Name(n) => {
                    if n != "pi" && n != "e" {
                        names.insert(n.clone());
                    }
                }
                Expr::Unary { operand, .. } => walk(operand, names),
                Expr::Binary { left, right, .. } => {
                    walk(left, names);
                    walk(right, names);
                }
                Expr::Call { args, .. } => args.iter().for_each(|a| walk(a, names)),
            }
        }
        let mut names = BTreeSet::new();
        walk(&self.parse(expression)?, &mut names);
        Ok(names)
    }
}
