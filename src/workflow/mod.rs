//! Workflow assembly, graph construction and the two evaluation strategies.
//!
//! A [`Workflow`] is built once, declaratively, through the
//! [`WorkflowBuilder`]: blocks are added in order, pipes connect variable
//! slots addressed by [`VariableRef`], one output slot is designated. `build`
//! validates the graph and derives everything evaluation needs: an arena of
//! variable ids local to the workflow instance, resolved pipe endpoints and
//! the ordered workflow-level input list.
//!
//! The input ordering is load-bearing: external callers address workflow
//! inputs by position, and the order is first-occurrence across blocks, then
//! across pipes (for free variables).

use crate::block::{Block, Variable, VariableRef};
use crate::error::{GraphError, RunError};
use crate::value::{SharedValue, shared};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

pub mod exchange;
mod run;
mod state;

pub use run::WorkflowRun;
pub use state::{Advance, WorkflowState};

pub(crate) type VarId = usize;

/// Directed value-copy edge between two variable slots. The value is relayed
/// by handle, never transformed or copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pipe {
    pub source: VariableRef,
    pub target: VariableRef,
}

/// Handle returned by [`WorkflowBuilder::add_block`], used to address the
/// block's variable slots when wiring pipes.
#[derive(Debug, Clone, Copy)]
pub struct BlockHandle {
    pub index: usize,
}

impl BlockHandle {
    pub fn input(self, port: usize) -> VariableRef {
        VariableRef::BlockInput {
            block: self.index,
            port,
        }
    }

    pub fn output(self, port: usize) -> VariableRef {
        VariableRef::BlockOutput {
            block: self.index,
            port,
        }
    }
}

/// Declarative assembly of a workflow. All validation happens in [`build`].
///
/// [`build`]: WorkflowBuilder::build
pub struct WorkflowBuilder {
    name: String,
    blocks: Vec<Block>,
    free_variables: Vec<Variable>,
    pipes: Vec<Pipe>,
    output: Option<VariableRef>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            free_variables: Vec::new(),
            pipes: Vec::new(),
            output: None,
        }
    }

    /// Appends a block. Declaration order matters twice over: it fixes the
    /// workflow input indices and the evaluation order of simultaneously
    /// ready blocks.
    pub fn add_block(&mut self, block: Block) -> BlockHandle {
        self.blocks.push(block);
        BlockHandle {
            index: self.blocks.len() - 1,
        }
    }

    /// Adds a free-standing workflow variable, typically to fan one workflow
    /// input out to several block inputs.
    pub fn add_variable(&mut self, variable: Variable) -> VariableRef {
        self.free_variables.push(variable);
        VariableRef::Free {
            index: self.free_variables.len() - 1,
        }
    }

    pub fn add_pipe(&mut self, source: VariableRef, target: VariableRef) -> &mut Self {
        self.pipes.push(Pipe { source, target });
        self
    }

    /// Designates the workflow's terminal output slot.
    pub fn output(&mut self, output: VariableRef) -> &mut Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> Result<Workflow, GraphError> {
        Workflow::assemble(
            self.name,
            self.blocks,
            self.free_variables,
            self.pipes,
            self.output,
        )
    }
}

/// An immutable dataflow graph of blocks and pipes, ready to run.
#[derive(Debug)]
pub struct Workflow {
    pub name: String,
    blocks: Vec<Block>,
    free_variables: Vec<Variable>,
    pipes: Vec<Pipe>,
    output: VariableRef,

    // Derived at construction, local to this instance.
    arena: Vec<VariableRef>,
    index_of: AHashMap<VariableRef, VarId>,
    pub(crate) block_inputs: Vec<Vec<VarId>>,
    pub(crate) block_outputs: Vec<Vec<VarId>>,
    pub(crate) pipe_endpoints: Vec<(VarId, VarId)>,
    input_ids: Vec<VarId>,
    input_positions: AHashMap<VarId, usize>,
    pub(crate) output_id: VarId,
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    fn assemble(
        name: String,
        blocks: Vec<Block>,
        free_variables: Vec<Variable>,
        pipes: Vec<Pipe>,
        output: Option<VariableRef>,
    ) -> Result<Workflow, GraphError> {
        // Intern every variable slot into the arena, blocks first (inputs
        // then outputs, in port order), free variables after.
        let mut arena = Vec::new();
        let mut index_of = AHashMap::new();
        let mut block_inputs = Vec::with_capacity(blocks.len());
        let mut block_outputs = Vec::with_capacity(blocks.len());
        for (b, block) in blocks.iter().enumerate() {
            let mut inputs = Vec::with_capacity(block.inputs().len());
            for port in 0..block.inputs().len() {
                let origin = VariableRef::BlockInput { block: b, port };
                index_of.insert(origin, arena.len());
                inputs.push(arena.len());
                arena.push(origin);
            }
            block_inputs.push(inputs);
            let mut outputs = Vec::with_capacity(block.outputs().len());
            for port in 0..block.outputs().len() {
                let origin = VariableRef::BlockOutput { block: b, port };
                index_of.insert(origin, arena.len());
                outputs.push(arena.len());
                arena.push(origin);
            }
            block_outputs.push(outputs);
        }
        for index in 0..free_variables.len() {
            let origin = VariableRef::Free { index };
            index_of.insert(origin, arena.len());
            arena.push(origin);
        }

        let workflow = Workflow {
            name,
            blocks,
            free_variables,
            pipes,
            output: output.ok_or(GraphError::DanglingOutput)?,
            arena,
            index_of,
            block_inputs,
            block_outputs,
            pipe_endpoints: Vec::new(),
            input_ids: Vec::new(),
            input_positions: AHashMap::new(),
            output_id: 0,
        };
        workflow.wire()
    }

    /// Resolves pipes and the output, validates the graph and computes the
    /// ordered input list.
    fn wire(mut self) -> Result<Workflow, GraphError> {
        let mut pipe_targeted = vec![false; self.arena.len()];
        let mut pipe_endpoints = Vec::with_capacity(self.pipes.len());
        for (pipe_index, pipe) in self.pipes.iter().enumerate() {
            let source = *self
                .index_of
                .get(&pipe.source)
                .ok_or(GraphError::DanglingPipeSource { pipe_index })?;
            if matches!(pipe.source, VariableRef::BlockInput { .. }) {
                return Err(GraphError::InvalidPipeSource { pipe_index });
            }
            let target = *self
                .index_of
                .get(&pipe.target)
                .ok_or(GraphError::DanglingPipeTarget { pipe_index })?;
            if !matches!(pipe.target, VariableRef::BlockInput { .. }) {
                return Err(GraphError::InvalidPipeTarget { pipe_index });
            }
            if pipe_targeted[target] {
                return Err(GraphError::DuplicatePipeTarget {
                    variable: self.variable_at(target).name.clone(),
                });
            }
            pipe_targeted[target] = true;
            pipe_endpoints.push((source, target));
        }
        self.pipe_endpoints = pipe_endpoints;

        self.output_id = *self
            .index_of
            .get(&self.output)
            .ok_or(GraphError::DanglingOutput)?;

        self.check_acyclic()?;

        // Workflow-level inputs: variables with no incoming edge, ordered
        // first-occurrence across blocks, then pipes, then leftover free
        // variables in declaration order.
        let mut produced = vec![false; self.arena.len()];
        for outputs in &self.block_outputs {
            for &id in outputs {
                produced[id] = true;
            }
        }
        let mut input_ids = Vec::new();
        let mut taken = vec![false; self.arena.len()];
        for id in 0..self.arena.len() {
            if matches!(self.arena[id], VariableRef::BlockInput { .. })
                && !pipe_targeted[id]
                && !taken[id]
            {
                taken[id] = true;
                input_ids.push(id);
            }
        }
        for &(source, _) in &self.pipe_endpoints {
            if matches!(self.arena[source], VariableRef::Free { .. }) && !taken[source] {
                taken[source] = true;
                input_ids.push(source);
            }
        }
        for id in 0..self.arena.len() {
            if matches!(self.arena[id], VariableRef::Free { .. })
                && !produced[id]
                && !taken[id]
            {
                taken[id] = true;
                input_ids.push(id);
            }
        }
        self.input_positions = input_ids
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();
        self.input_ids = input_ids;
        Ok(self)
    }

    /// Depth-first cycle check over the bipartite dependency graph:
    /// variable -> consuming block, block -> produced variable, pipe source
    /// -> pipe target. Nested workflows are opaque single nodes here, so
    /// iteration constructs never introduce a parent-level cycle.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let var_count = self.arena.len();
        let node_count = var_count + self.blocks.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (b, inputs) in self.block_inputs.iter().enumerate() {
            for &id in inputs {
                adjacency[id].push(var_count + b);
            }
        }
        for (b, outputs) in self.block_outputs.iter().enumerate() {
            for &id in outputs {
                adjacency[var_count + b].push(id);
            }
        }
        for &(source, target) in &self.pipe_endpoints {
            adjacency[source].push(target);
        }

        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; node_count];
        for start in 0..node_count {
            if color[start] != WHITE {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            color[start] = GRAY;
            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if next < adjacency[node].len() {
                    frame.1 += 1;
                    let successor = adjacency[node][next];
                    match color[successor] {
                        WHITE => {
                            color[successor] = GRAY;
                            stack.push((successor, 0));
                        }
                        GRAY => {
                            let variable = if successor < var_count {
                                self.variable_at(successor).name.clone()
                            } else {
                                self.blocks[successor - var_count].name().to_string()
                            };
                            return Err(GraphError::CyclicDependency { variable });
                        }
                        _ => {}
                    }
                } else {
                    color[node] = BLACK;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Resolves an arena id back to the variable metadata it addresses.
    pub(crate) fn variable_at(&self, id: VarId) -> &Variable {
        match self.arena[id] {
            VariableRef::BlockInput { block, port } => &self.blocks[block].inputs()[port],
            VariableRef::BlockOutput { block, port } => &self.blocks[block].outputs()[port],
            VariableRef::Free { index } => &self.free_variables[index],
        }
    }

    pub(crate) fn variable_count(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn input_ids(&self) -> &[VarId] {
        &self.input_ids
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn free_variables(&self) -> &[Variable] {
        &self.free_variables
    }

    /// The designated output slot.
    pub fn output(&self) -> VariableRef {
        self.output
    }

    pub fn output_variable(&self) -> &Variable {
        self.variable_at(self.output_id)
    }

    /// Workflow-level input variables, in addressable order.
    pub fn inputs(&self) -> impl Iterator<Item = &Variable> {
        self.input_ids.iter().map(|&id| self.variable_at(id))
    }

    pub fn input_count(&self) -> usize {
        self.input_ids.len()
    }

    /// The positional index a caller must use to bind this slot, if it is a
    /// workflow-level input.
    pub fn input_index(&self, variable: VariableRef) -> Option<usize> {
        let id = *self.index_of.get(&variable)?;
        self.input_positions.get(&id).copied()
    }

    /// The slot behind a positional input index.
    pub fn input_origin(&self, index: usize) -> Option<VariableRef> {
        self.input_ids.get(index).map(|&id| self.arena[id])
    }

    pub(crate) fn origin_at(&self, id: VarId) -> VariableRef {
        self.arena[id]
    }

    pub(crate) fn id_of(&self, variable: VariableRef) -> Option<VarId> {
        self.index_of.get(&variable).copied()
    }

    /// Runs the workflow to completion. Every workflow input must be covered
    /// by `input_values` (keyed by positional index) or by a declared
    /// default; the run fails fast on an arity mismatch and aborts on the
    /// first block failure.
    pub fn run(
        &self,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Result<WorkflowRun<'_>, RunError> {
        let merged = self.merge_defaults(input_values)?;
        let mut state = self.start_run(&merged)?;
        state.continue_run()?;
        state.finalize()
    }

    /// Creates a paused run with a partial (possibly empty) input binding,
    /// to be driven with [`WorkflowState::advance`]. Defaults are *not*
    /// merged here; stepwise callers control every binding.
    pub fn start_run(
        &self,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Result<WorkflowState<'_>, RunError> {
        for &index in input_values.keys() {
            if index >= self.input_ids.len() {
                return Err(RunError::UnknownInputIndex { index });
            }
        }
        Ok(WorkflowState::new(self, input_values))
    }

    fn merge_defaults(
        &self,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Result<AHashMap<usize, SharedValue>, RunError> {
        for &index in input_values.keys() {
            if index >= self.input_ids.len() {
                return Err(RunError::UnknownInputIndex { index });
            }
        }
        let mut merged = input_values.clone();
        for (position, &id) in self.input_ids.iter().enumerate() {
            if !merged.contains_key(&position) {
                if let Some(default) = &self.variable_at(id).default {
                    merged.insert(position, shared(default.clone()));
                }
            }
        }
        if merged.len() != self.input_ids.len() {
            return Err(RunError::ArityMismatch {
                expected: self.input_ids.len(),
                provided: merged.len(),
            });
        }
        Ok(merged)
    }
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        // Derived fields are a pure function of these, so structural equality
        // only needs the declaration.
        self.name == other.name
            && self.blocks == other.blocks
            && self.free_variables == other.free_variables
            && self.pipes == other.pipes
            && self.output == other.output
    }
}
