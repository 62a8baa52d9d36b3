//! Seams implemented by the caller.

use serde::{Deserialize, Serialize};

use crate::model::{Bindings, SlotAnswer};
use crate::ordered::OrderedMap;

// ---------------------------------------------------------------------------
// Host code
// ---------------------------------------------------------------------------

/// Runs a template's `[[code]]` block in the caller's own sandbox.
///
/// The core never executes template code itself; templates that carry a
/// code block can only be rendered when an implementation is supplied.
pub trait HostCode: Send + Sync {
    /// Human-readable runner name (e.g. "python-sandbox").
    fn name(&self) -> &str;

    /// Execute `code` with the drawn variables as input.
    fn run(&self, code: &str, variables: &Bindings) -> anyhow::Result<HostOutput>;
}

/// What a host-code block may contribute to an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostOutput {
    /// Derived variables, merged over the drawn ones.
    #[serde(default)]
    pub variables: Bindings,
    /// Extra grading entries, merged over the template's.
    #[serde(default)]
    pub grading: OrderedMap<SlotAnswer>,
}

/// Host that answers every call with a fixed output. Useful in tests and
/// for pre-computed answer tables.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub output: HostOutput,
}

impl HostCode for StaticHost {
    fn name(&self) -> &str {
        "static"
    }

    fn run(&self, _code: &str, _variables: &Bindings) -> anyhow::Result<HostOutput> {
        Ok(self.output.clone())
    }
}
