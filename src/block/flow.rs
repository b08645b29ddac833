//! Structural blocks: sequence plumbing and nested workflow execution.

use super::{EvalContext, Variable, expect_sequence};
use crate::error::{EvalError, GraphError};
use crate::value::{SharedValue, Typing, Value, shared};
use crate::workflow::Workflow;
use ahash::AHashMap;
use std::rc::Rc;

/// Concatenates a fixed number of sequences into one, preserving order.
#[derive(Debug, PartialEq)]
pub struct Concatenate {
    pub name: String,
    pub parts: usize,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl Concatenate {
    pub fn new(parts: usize, name: impl Into<String>) -> Self {
        let inputs = (0..parts)
            .map(|i| Variable::typed(format!("sequence {}", i), Typing::Sequence))
            .collect();
        Self {
            name: name.into(),
            parts,
            inputs,
            outputs: vec![Variable::typed("concatenation", Typing::Sequence)],
        }
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let mut items = Vec::new();
        for value in values {
            items.extend(expect_sequence(value, "Concatenate")?);
        }
        Ok(vec![shared(Value::Sequence(items))])
    }
}

/// Extracts the configured indices out of a sequence, one output per index.
/// Extracted elements share ownership with the source sequence.
#[derive(Debug, PartialEq)]
pub struct Unpacker {
    pub name: String,
    pub indices: Vec<usize>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl Unpacker {
    pub fn new(indices: Vec<usize>, name: impl Into<String>) -> Self {
        let outputs = indices
            .iter()
            .map(|i| Variable::new(format!("element {}", i)))
            .collect();
        Self {
            name: name.into(),
            indices,
            inputs: vec![Variable::typed("sequence", Typing::Sequence)],
            outputs,
        }
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let items = expect_sequence(&values[0], "Unpacker")?;
        self.indices
            .iter()
            .map(|&index| {
                items.get(index).cloned().ok_or(EvalError::IndexOutOfRange {
                    index,
                    length: items.len(),
                })
            })
            .collect()
    }
}

/// Wraps a nested workflow as a single block. Inputs and outputs mirror the
/// nested workflow's own boundary; evaluation is a full nested
/// run-to-completion, blocking the parent pass until it finishes.
#[derive(Debug, PartialEq)]
pub struct WorkflowBlock {
    pub name: String,
    pub workflow: Rc<Workflow>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl WorkflowBlock {
    pub fn new(workflow: Rc<Workflow>, name: impl Into<String>) -> Self {
        let inputs = workflow.inputs().cloned().collect();
        let outputs = vec![workflow.output_variable().clone()];
        Self {
            name: name.into(),
            workflow,
            inputs,
            outputs,
        }
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let input_values: AHashMap<usize, SharedValue> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.clone()))
            .collect();
        let run = self
            .workflow
            .run(&input_values)
            .map_err(|e| EvalError::Nested {
                workflow: self.workflow.name.clone(),
                message: e.to_string(),
            })?;
        Ok(vec![run.output_value().clone()])
    }
}

/// Runs a wrapped [`WorkflowBlock`] once per element of an input collection.
///
/// The input at `iter_input_index` is the collection; the other inputs are
/// forwarded unchanged to every iteration. Outputs preserve input order, an
/// empty collection yields an empty sequence without ever invoking the
/// sub-workflow.
#[derive(Debug, PartialEq)]
pub struct ForEach {
    pub name: String,
    pub workflow_block: WorkflowBlock,
    pub iter_input_index: usize,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl ForEach {
    pub fn new(
        workflow_block: WorkflowBlock,
        iter_input_index: usize,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        if iter_input_index >= workflow_block.inputs.len() {
            return Err(GraphError::InvalidIterInput {
                index: iter_input_index,
                arity: workflow_block.inputs.len(),
            });
        }
        let mut inputs = workflow_block.inputs.clone();
        inputs[iter_input_index] = Variable::typed("foreach iterable", Typing::Sequence);
        Ok(Self {
            name: name.into(),
            workflow_block,
            iter_input_index,
            inputs,
            outputs: vec![Variable::typed("foreach output", Typing::Sequence)],
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let items = expect_sequence(&values[self.iter_input_index], "ForEach")?;
        let mut collected = Vec::with_capacity(items.len());
        for item in items {
            let mut iteration_values = values.to_vec();
            iteration_values[self.iter_input_index] = item;
            let mut outputs = self.workflow_block.evaluate(&iteration_values, ctx)?;
            collected.push(outputs.remove(0));
        }
        Ok(vec![shared(Value::Sequence(collected))])
    }
}
