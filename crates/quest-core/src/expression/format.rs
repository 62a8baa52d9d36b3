//! Canonical decimal formatting of evaluator results.
//!
//! A result is first written as its shortest round-tripping decimal (with a
//! trailing `.0` for integral floats), optionally rounded half-even to a
//! number of significant figures, then printed in engineering notation
//! (exponent a multiple of three, only when the number is very large or
//! very small).

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::EvalError;

use super::eval::Number;

/// A decimal as sign, coefficient digits and base-10 exponent, kept apart
/// so trailing zeros of the coefficient survive printing.
#[derive(Debug, PartialEq)]
struct EngDecimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

impl EngDecimal {
    fn from_number(n: Number) -> Result<Self, EvalError> {
        if !n.value.is_finite() {
            return Err(EvalError::NonFinite);
        }
        let negative = n.value.is_sign_negative();
        let x = n.value.abs();

        if n.integral {
            return Ok(Self {
                negative: negative && x != 0.0,
                digits: format!("{x:.0}"),
                exponent: 0,
            });
        }
        if x == 0.0 {
            return Ok(Self {
                negative,
                digits: "0".into(),
                exponent: -1,
            });
        }

        // `{:e}` yields the shortest representation, e.g. "1.2345e4".
        let (digits, sci_exp) = split_scientific(&format!("{x:e}"));
        let last_digit_exp = sci_exp - (digits.len() as i64 - 1);

        // Plain notation for 1e-4 <= x < 1e16 always shows a fraction.
        if (-4..16).contains(&sci_exp) && last_digit_exp >= 0 {
            let mut padded = digits;
            padded.extend(std::iter::repeat('0').take(last_digit_exp as usize + 1));
            return Ok(Self {
                negative,
                digits: padded,
                exponent: -1,
            });
        }
        Ok(Self {
            negative,
            digits,
            exponent: last_digit_exp,
        })
    }

    /// Round half-even to at most `precision` significant digits.
    fn round(self, precision: usize) -> Self {
        let precision = precision.max(1);
        if self.digits.len() <= precision {
            return self;
        }
        let (digits, exponent) = self
            .round_decimal(precision)
            .unwrap_or_else(|| self.round_float(precision));
        Self {
            negative: self.negative,
            digits,
            exponent,
        }
    }

    fn round_decimal(&self, precision: usize) -> Option<(String, i64)> {
        let value = Decimal::from_scientific(&format!("{}e{}", self.digits, self.exponent)).ok()?;
        let rounded =
            value.round_sf_with_strategy(precision as u32, RoundingStrategy::MidpointNearestEven)?;
        let mantissa = rounded.mantissa().unsigned_abs().to_string();
        let exponent = -i64::from(rounded.scale());
        Some(fit_digits(mantissa, exponent, precision))
    }

    /// Magnitudes outside the `Decimal` range round through the float.
    fn round_float(&self, precision: usize) -> (String, i64) {
        let x: f64 = format!("{}e{}", self.digits, self.exponent)
            .parse()
            .unwrap_or(0.0);
        let (digits, sci_exp) = split_scientific(&format!("{:.*e}", precision - 1, x));
        let exponent = sci_exp - (digits.len() as i64 - 1);
        fit_digits(digits, exponent, precision)
    }

    fn to_eng_string(&self) -> String {
        let coeff = self.digits.as_str();
        let len = coeff.len() as i64;
        let left_digits = self.exponent + len;

        let dot_place = if self.exponent <= 0 && left_digits > -6 {
            left_digits
        } else if coeff == "0" {
            (left_digits + 1).rem_euclid(3) - 1
        } else {
            (left_digits - 1).rem_euclid(3) + 1
        };

        let (int_part, frac_part) = if dot_place <= 0 {
            (
                "0".to_string(),
                format!(".{}{}", "0".repeat((-dot_place) as usize), coeff),
            )
        } else if dot_place >= len {
            (
                format!("{}{}", coeff, "0".repeat((dot_place - len) as usize)),
                String::new(),
            )
        } else {
            let (i, f) = coeff.split_at(dot_place as usize);
            (i.to_string(), format!(".{f}"))
        };

        let exp = if left_digits == dot_place {
            String::new()
        } else {
            format!("E{:+}", left_digits - dot_place)
        };
        let sign = if self.negative { "-" } else { "" };
        format!("{sign}{int_part}{frac_part}{exp}")
    }
}

fn split_scientific(sci: &str) -> (String, i64) {
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci, "0"));
    let digits = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits, exp.parse().unwrap_or(0))
}

/// Trim or pad a coefficient to exactly `precision` digits.
fn fit_digits(mut digits: String, mut exponent: i64, precision: usize) -> (String, i64) {
    if digits.len() > precision {
        exponent += (digits.len() - precision) as i64;
        digits.truncate(precision);
    } else {
        let pad = precision - digits.len();
        digits.extend(std::iter::repeat('0').take(pad));
        exponent -= pad as i64;
    }
    (digits, exponent)
}

/// Format an evaluated number, optionally to `sig_figs` significant figures.
pub fn format_number(n: Number, sig_figs: Option<usize>) -> Result<String, EvalError> {
    let decimal = EngDecimal::from_number(n)?;
    let decimal = match sig_figs {
        Some(sig_figs) => decimal.round(sig_figs),
        None => decimal,
    };
    Ok(decimal.to_eng_string())
}
