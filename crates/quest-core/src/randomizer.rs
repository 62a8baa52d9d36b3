//! Variable randomizer.
//!
//! Draws concrete values for declared variables from an injected random
//! source, so identical seeds reproduce identical instances.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution as _, Normal};

use crate::model::{Bindings, Distribution, NumericType, Value, VariableSpec};
use crate::ordered::OrderedMap;

/// Characters used for labels and input tokens (no look-alike glyphs).
const TOKEN_ALPHABET: &[u8] = b"ABCEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz2345689";

/// Generate an opaque random token of `len` characters.
pub fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Draw one value for a variable spec.
pub fn draw<R: Rng + ?Sized>(spec: &VariableSpec, rng: &mut R) -> Value {
    match spec {
        VariableSpec::Choice { choices } => choices
            .choose(rng)
            .map(|c| Value::Text(c.clone()))
            .unwrap_or_else(|| Value::Text(String::new())),
        VariableSpec::Range {
            low,
            high,
            step,
            numeric_type,
            distribution,
        } => draw_range(*low, *high, *step, *numeric_type, *distribution, rng),
    }
}

fn draw_range<R: Rng + ?Sized>(
    low: f64,
    high: f64,
    step: f64,
    numeric_type: NumericType,
    distribution: Distribution,
    rng: &mut R,
) -> Value {
    let (lo, hi) = finite_bounds(low, high, numeric_type);

    let sample = match distribution {
        Distribution::Uniform => rng.gen::<f64>(),
        // ~99.7% of the mass lands inside [0, 1]; the clamp handles the rest.
        Distribution::Normal => match Normal::new(0.5, 1.0 / 6.0) {
            Ok(normal) => normal.sample(rng),
            Err(_) => rng.gen::<f64>(),
        },
    };

    // Offset from `lo`, written so that f64::MIN..f64::MAX cannot overflow.
    let offset = sample * hi - sample * lo;
    let mut value = if offset.is_finite() {
        lo + offset
    } else {
        lo * (1.0 - sample) + hi * sample
    };

    // Snap to a multiple of `step` from `lo`, rounding down or up at random
    // so neither direction is favored.
    if step > 0.0 && offset.is_finite() {
        let steps = offset / step;
        let snapped = if rng.gen_bool(0.5) {
            steps.floor()
        } else {
            steps.ceil()
        };
        value = lo + snapped * step;
    }

    value = value.clamp(lo, hi);

    match numeric_type {
        NumericType::Int => Value::Int(value.trunc() as i64),
        NumericType::Float => Value::Float(value),
    }
}

fn finite_bounds(low: f64, high: f64, numeric_type: NumericType) -> (f64, f64) {
    let (min, max) = match numeric_type {
        NumericType::Int => (i64::MIN as f64, i64::MAX as f64),
        NumericType::Float => (f64::MIN, f64::MAX),
    };
    let lo = if low.is_infinite() { min } else { low };
    let hi = if high.is_infinite() { max } else { high };
    (lo, hi)
}

/// Resolve every declared variable, in declaration order.
pub fn resolve_variables<R: Rng + ?Sized>(
    variables: &OrderedMap<VariableSpec>,
    rng: &mut R,
) -> Bindings {
    variables
        .iter()
        .map(|(name, spec)| {
            let value = draw(spec, rng);
            tracing::debug!(variable = name, %value, "drew variable");
            (name.to_string(), value)
        })
        .collect()
}
