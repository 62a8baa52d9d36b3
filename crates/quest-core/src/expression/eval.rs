//! AST interpreter over the allow-listed operator and function table.
//!
//! Nothing outside this table is reachable: there are no loops, no
//! assignments and no host calls, so evaluation is bounded by the size of
//! the parsed expression.

use crate::error::EvalError;
use crate::model::{Bindings, Value};

use super::parser::{BinaryOperator, Expr, UnaryOperator};

/// Integers above this magnitude are no longer exact in an `f64`.
const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Evaluated number, remembering whether integer arithmetic produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Number {
    pub value: f64,
    pub integral: bool,
}

impl Number {
    fn int(value: f64) -> Self {
        Self {
            value,
            integral: value.abs() < EXACT_INT_LIMIT,
        }
    }

    fn float(value: f64) -> Self {
        Self {
            value,
            integral: false,
        }
    }

    fn keep(value: f64, integral: bool) -> Self {
        if integral {
            Self::int(value)
        } else {
            Self::float(value)
        }
    }
}

fn binding(name: &str, bindings: &Bindings) -> Result<Number, EvalError> {
    if let Some(value) = bindings.get(name) {
        return match value {
            Value::Int(i) => Ok(Number::int(*i as f64)),
            Value::Float(f) => Ok(Number::float(*f)),
            Value::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Number::int(i as f64))
                } else {
                    s.parse::<f64>()
                        .map(Number::float)
                        .map_err(|_| EvalError::NonNumeric(name.to_string()))
                }
            }
        };
    }
    match name {
        "pi" => Ok(Number::float(std::f64::consts::PI)),
        "e" => Ok(Number::float(std::f64::consts::E)),
        _ => Err(EvalError::UndefinedVariable(name.to_string())),
    }
}

pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<Number, EvalError> {
    match expr {
        Expr::Integer(i) => Ok(Number::int(*i as f64)),
        Expr::Number(n) => Ok(Number::float(*n)),
        Expr::Name(name) => binding(name, bindings),
        Expr::Unary { op, operand } => {
            let v = evaluate(operand, bindings)?;
            Ok(match op {
                UnaryOperator::Neg => Number::keep(-v.value, v.integral),
                UnaryOperator::Plus => v,
            })
        }
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, bindings)?;
            let r = evaluate(right, bindings)?;
            binary(*op, l, r)
        }
        Expr::Call { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate(a, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &values)
        }
    }
}

fn truth(b: bool) -> Number {
    Number::int(if b { 1.0 } else { 0.0 })
}

fn binary(op: BinaryOperator, l: Number, r: Number) -> Result<Number, EvalError> {
    let both_int = l.integral && r.integral;
    let (a, b) = (l.value, r.value);
    let out = match op {
        BinaryOperator::Add => Number::keep(a + b, both_int),
        BinaryOperator::Sub => Number::keep(a - b, both_int),
        BinaryOperator::Mul => Number::keep(a * b, both_int),
        BinaryOperator::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Number::float(a / b)
        }
        // Result takes the sign of the divisor.
        BinaryOperator::Rem => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Number::keep(a - b * (a / b).floor(), both_int)
        }
        BinaryOperator::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(EvalError::InvalidArgument(format!(
                    "negative number {a} raised to a fractional power"
                )));
            }
            Number::keep(a.powf(b), both_int && b >= 0.0)
        }
        BinaryOperator::Lt => truth(a < b),
        BinaryOperator::Le => truth(a <= b),
        BinaryOperator::Gt => truth(a > b),
        BinaryOperator::Ge => truth(a >= b),
        BinaryOperator::Eq => truth(a == b),
        BinaryOperator::Ne => truth(a != b),
    };
    Ok(out)
}

fn arity(name: &str, args: &[Number], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

fn domain(name: &str, x: f64) -> EvalError {
    EvalError::InvalidArgument(format!("{name}({x}) is outside the function's domain"))
}

/// Apply a one-argument real function, checking its domain first.
fn unary_fn(
    name: &str,
    args: &[Number],
    f: fn(f64) -> f64,
    ok: fn(f64) -> bool,
) -> Result<Number, EvalError> {
    arity(name, args, 1)?;
    let x = args[0].value;
    if !ok(x) {
        return Err(domain(name, x));
    }
    Ok(Number::float(f(x)))
}

fn any(_: f64) -> bool {
    true
}

fn round_half_even(x: f64, digits: i32) -> f64 {
    if digits == 0 {
        return x.round_ties_even();
    }
    let scale = 10f64.powi(digits);
    (x * scale).round_ties_even() / scale
}

fn factorial(name: &str, x: Number) -> Result<Number, EvalError> {
    if !x.integral || x.value < 0.0 {
        return Err(EvalError::InvalidArgument(format!(
            "{name}() only accepts non-negative integers"
        )));
    }
    // 171! overflows an f64.
    if x.value > 170.0 {
        return Err(EvalError::NonFinite);
    }
    let n = x.value as u32;
    Ok(Number::int((2..=n).fold(1.0, |acc, k| acc * k as f64)))
}

fn call(name: &str, args: &[Number]) -> Result<Number, EvalError> {
    match name {
        "sin" => unary_fn(name, args, f64::sin, any),
        "cos" => unary_fn(name, args, f64::cos, any),
        "tan" => unary_fn(name, args, f64::tan, any),
        "asin" => unary_fn(name, args, f64::asin, |x| (-1.0..=1.0).contains(&x)),
        "acos" => unary_fn(name, args, f64::acos, |x| (-1.0..=1.0).contains(&x)),
        "atan" => unary_fn(name, args, f64::atan, any),
        "sinh" => unary_fn(name, args, f64::sinh, any),
        "cosh" => unary_fn(name, args, f64::cosh, any),
        "tanh" => unary_fn(name, args, f64::tanh, any),
        "asinh" => unary_fn(name, args, f64::asinh, any),
        "acosh" => unary_fn(name, args, f64::acosh, |x| x >= 1.0),
        "atanh" => unary_fn(name, args, f64::atanh, |x| x > -1.0 && x < 1.0),
        "exp" => unary_fn(name, args, f64::exp, any),
        "ln" => unary_fn(name, args, f64::ln, |x| x > 0.0),
        "log10" => unary_fn(name, args, f64::log10, |x| x > 0.0),
        "log1p" => unary_fn(name, args, f64::ln_1p, |x| x > -1.0),
        "sqrt" => unary_fn(name, args, f64::sqrt, |x| x >= 0.0),
        "degrees" => unary_fn(name, args, f64::to_degrees, any),
        "radians" => unary_fn(name, args, f64::to_radians, any),
        "fabs" => unary_fn(name, args, f64::abs, any),
        "abs" => {
            arity(name, args, 1)?;
            Ok(Number::keep(args[0].value.abs(), args[0].integral))
        }
        "floor" => {
            arity(name, args, 1)?;
            Ok(Number::int(args[0].value.floor()))
        }
        "ceil" => {
            arity(name, args, 1)?;
            Ok(Number::int(args[0].value.ceil()))
        }
        "trunc" => {
            arity(name, args, 1)?;
            Ok(Number::int(args[0].value.trunc()))
        }
        "round" => match args {
            [x] => Ok(Number::int(round_half_even(x.value, 0))),
            [x, n] if n.integral => Ok(Number::keep(
                round_half_even(x.value, n.value as i32),
                x.integral,
            )),
            [_, _] => Err(EvalError::InvalidArgument(
                "round() digits must be an integer".into(),
            )),
            _ => Err(EvalError::Arity {
                name: name.to_string(),
                expected: "1 or 2".into(),
                got: args.len(),
            }),
        },
        "min" | "max" => {
            let first = args.first().ok_or_else(|| EvalError::Arity {
                name: name.to_string(),
                expected: "at least 1".into(),
                got: 0,
            })?;
            let pick = args.iter().skip(1).fold(*first, |best, n| {
                let better = if name == "min" {
                    n.value < best.value
                } else {
                    n.value > best.value
                };
                if better {
                    *n
                } else {
                    best
                }
            });
            Ok(pick)
        }
        "pow" => {
            arity(name, args, 2)?;
            // math.pow semantics: always a float.
            binary(BinaryOperator::Pow, args[0], args[1]).map(|n| Number::float(n.value))
        }
        "atan2" => {
            arity(name, args, 2)?;
            Ok(Number::float(args[0].value.atan2(args[1].value)))
        }
        "hypot" => {
            arity(name, args, 2)?;
            Ok(Number::float(args[0].value.hypot(args[1].value)))
        }
        "copysign" => {
            arity(name, args, 2)?;
            Ok(Number::float(args[0].value.copysign(args[1].value)))
        }
        "fmod" => {
            arity(name, args, 2)?;
            if args[1].value == 0.0 {
                return Err(domain(name, args[0].value));
            }
            Ok(Number::float(args[0].value % args[1].value))
        }
        "factorial" => {
            arity(name, args, 1)?;
            factorial(name, args[0])
        }
        "log" => Err(EvalError::AmbiguousLog),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}
