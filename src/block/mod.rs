//! Blocks: the typed computational units of a workflow.
//!
//! A block exposes a fixed, ordered list of input and output [`Variable`]s
//! decided at construction time, and an `evaluate` operation that consumes
//! one value per input and must return exactly one value per output, in
//! output order. The set of variants is a closed sum type; user extension
//! happens through the [`ModelRegistry`](crate::model::ModelRegistry)
//! (classes, methods, functions, writers), not through new variants.

use crate::error::EvalError;
use crate::log::RunLog;
use crate::value::{SharedValue, Typing, Value};
use serde::{Deserialize, Serialize};

mod flow;
mod model_ops;
mod sinks;

pub use flow::{Concatenate, ForEach, Unpacker, WorkflowBlock};
pub use model_ops::{FunctionCall, InstantiateModel, ModelAttribute, ModelMethod};
pub use sinks::{Archive, Export, MultiPlot};

/// A named, typed value slot owned by a block (or free-standing at the
/// workflow boundary). Identity is positional: a variable is *addressed* by a
/// [`VariableRef`], never found by name; names may collide across blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub typing: Typing,
    pub default: Option<Value>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            typing: Typing::Any,
            default: None,
        }
    }

    pub fn typed(name: impl Into<String>, typing: Typing) -> Self {
        Self {
            name: name.into(),
            typing,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Position-based address of a variable inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableRef {
    /// Input slot `port` of block `block`.
    BlockInput { block: usize, port: usize },
    /// Output slot `port` of block `block`.
    BlockOutput { block: usize, port: usize },
    /// Free-standing workflow variable, used to fan one workflow input out to
    /// several pipes.
    Free { index: usize },
}

/// Per-evaluation context handed to block bodies: access to the run log and
/// to the caller-supplied progress callback.
///
/// Sub-progress reported by a long-running method is forwarded unchanged; the
/// engine performs no aggregation beyond that block's own report.
pub struct EvalContext<'a> {
    pub(crate) progress: Option<&'a dyn Fn(f64)>,
    pub(crate) log: &'a mut RunLog,
}

impl EvalContext<'_> {
    pub fn report_progress(&self, fraction: f64) {
        if let Some(callback) = self.progress {
            callback(fraction.clamp(0.0, 1.0));
        }
    }

    pub fn log(&mut self, entry: impl Into<String>) {
        self.log.push(entry);
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            Block::InstantiateModel($inner) => $body,
            Block::ModelMethod($inner) => $body,
            Block::ModelAttribute($inner) => $body,
            Block::FunctionCall($inner) => $body,
            Block::Concatenate($inner) => $body,
            Block::Unpacker($inner) => $body,
            Block::WorkflowBlock($inner) => $body,
            Block::ForEach($inner) => $body,
            Block::Export($inner) => $body,
            Block::Archive($inner) => $body,
            Block::MultiPlot($inner) => $body,
        }
    };
}

/// Polymorphic computational unit, one case per variant.
#[derive(Debug, PartialEq)]
pub enum Block {
    InstantiateModel(InstantiateModel),
    ModelMethod(ModelMethod),
    ModelAttribute(ModelAttribute),
    FunctionCall(FunctionCall),
    Concatenate(Concatenate),
    Unpacker(Unpacker),
    WorkflowBlock(WorkflowBlock),
    ForEach(ForEach),
    Export(Export),
    Archive(Archive),
    MultiPlot(MultiPlot),
}

impl Block {
    /// Human label given at construction.
    pub fn name(&self) -> &str {
        dispatch!(self, b => &b.name)
    }

    /// Stable variant name, used in logs and the exchange representation.
    pub fn kind(&self) -> &'static str {
        match self {
            Block::InstantiateModel(_) => "InstantiateModel",
            Block::ModelMethod(_) => "ModelMethod",
            Block::ModelAttribute(_) => "ModelAttribute",
            Block::FunctionCall(_) => "FunctionCall",
            Block::Concatenate(_) => "Concatenate",
            Block::Unpacker(_) => "Unpacker",
            Block::WorkflowBlock(_) => "WorkflowBlock",
            Block::ForEach(_) => "ForEach",
            Block::Export(_) => "Export",
            Block::Archive(_) => "Archive",
            Block::MultiPlot(_) => "MultiPlot",
        }
    }

    pub fn inputs(&self) -> &[Variable] {
        dispatch!(self, b => &b.inputs)
    }

    pub fn outputs(&self) -> &[Variable] {
        dispatch!(self, b => &b.outputs)
    }

    /// Runs the block against one ordered value per input. Returns exactly
    /// one value per declared output, in output order.
    pub fn evaluate(
        &self,
        values: &[SharedValue],
        ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        dispatch!(self, b => b.evaluate(values, ctx))
    }
}

/// Borrows the inner value of an input and checks it is a sequence.
/// Shared helper for the blocks that iterate collections.
pub(crate) fn expect_sequence(
    value: &SharedValue,
    operation: &str,
) -> Result<Vec<SharedValue>, EvalError> {
    match &*value.borrow() {
        Value::Sequence(items) => Ok(items.clone()),
        other => Err(EvalError::TypeMismatch {
            operation: operation.to_string(),
            expected: "Sequence".to_string(),
            found: other.kind().to_string(),
        }),
    }
}
