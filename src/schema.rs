//! Input schema boundary.
//!
//! The engine does not generate forms or JSON schemas itself; it exposes the
//! structured facts an external generator needs. [`InputSchema`] rows carry
//! the positional index, the display name, the declared typing and whether a
//! default exists, in the exact order a caller must use to bind values.

use crate::block::Block;
use crate::value::Typing;
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};

/// One bindable input slot, described for an external schema or form
/// generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Positional index used with `run`, `start_run` and `add_input_values`.
    pub index: usize,
    pub name: String,
    pub typing: Typing,
    /// JSON-schema primitive the typing maps to.
    pub json_type: String,
    /// Whether the slot can be left unbound in a `run` call.
    pub has_default: bool,
}

impl Workflow {
    /// Describes every workflow-level input, in positional order.
    pub fn input_schema(&self) -> Vec<InputSchema> {
        self.inputs()
            .enumerate()
            .map(|(index, variable)| InputSchema {
                index,
                name: variable.name.clone(),
                typing: variable.typing.clone(),
                json_type: variable.typing.json_type().to_string(),
                has_default: variable.default.is_some(),
            })
            .collect()
    }
}

/// Describes one block's own input slots, indexed by port. Useful for
/// rendering a per-block form when injecting values mid-run.
pub fn block_input_schema(block: &Block) -> Vec<InputSchema> {
    block
        .inputs()
        .iter()
        .enumerate()
        .map(|(port, variable)| InputSchema {
            index: port,
            name: variable.name.clone(),
            typing: variable.typing.clone(),
            json_type: variable.typing.json_type().to_string(),
            has_default: variable.default.is_some(),
        })
        .collect()
}
