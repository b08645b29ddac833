use super::{VarId, Workflow, WorkflowRun};
use crate::block::EvalContext;
use crate::error::{EvalError, RunError};
use crate::log::RunLog;
use crate::value::SharedValue;
use ahash::AHashMap;

/// Outcome of a single [`WorkflowState::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// All currently-ready pipes were propagated in one go.
    PipesPropagated(usize),
    /// Exactly one block (by declaration index) was evaluated.
    BlockEvaluated(usize),
    /// No further activation is possible.
    Finished,
}

/// Mutable, in-progress snapshot of one workflow run.
///
/// Holds the activation flag of every variable, pipe and block plus the
/// values bound so far. The state is exclusively owned by the caller driving
/// it; nothing in the engine touches it between steps, which is what makes
/// mid-run input injection safe.
pub struct WorkflowState<'w> {
    workflow: &'w Workflow,
    values: AHashMap<VarId, SharedValue>,
    variable_activated: Vec<bool>,
    pipe_activated: Vec<bool>,
    block_activated: Vec<bool>,
    log: RunLog,
    progress_callback: Option<Box<dyn Fn(f64) + 'w>>,
    failed: bool,
}

impl<'w> WorkflowState<'w> {
    pub(crate) fn new(
        workflow: &'w Workflow,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Self {
        let mut state = Self {
            workflow,
            values: AHashMap::new(),
            variable_activated: vec![false; workflow.variable_count()],
            pipe_activated: vec![false; workflow.pipes().len()],
            block_activated: vec![false; workflow.blocks().len()],
            log: RunLog::new(),
            progress_callback: None,
            failed: false,
        };
        for (&index, value) in input_values {
            let id = workflow.input_ids()[index];
            state.bind(id, value.clone());
        }
        state.log.push(format!(
            "Run of workflow '{}' started with {} of {} inputs bound",
            workflow.name,
            input_values.len(),
            workflow.input_count()
        ));
        tracing::debug!(workflow = %workflow.name, bound = input_values.len(), "run started");
        state
    }

    /// Rebuilds a paused state from a decoded snapshot. Variable activation
    /// is implied by the bindings; a variable is activated exactly when it
    /// holds a value.
    pub(crate) fn restore(
        workflow: &'w Workflow,
        values: AHashMap<VarId, SharedValue>,
        pipe_activated: Vec<bool>,
        block_activated: Vec<bool>,
        log: RunLog,
    ) -> Self {
        let mut variable_activated = vec![false; workflow.variable_count()];
        for &id in values.keys() {
            variable_activated[id] = true;
        }
        Self {
            workflow,
            values,
            variable_activated,
            pipe_activated,
            block_activated,
            log,
            progress_callback: None,
            failed: false,
        }
    }

    /// Installs a progress callback. It receives the overall block progress
    /// after every evaluation and is forwarded unchanged to user methods
    /// that report fractional sub-progress.
    pub fn with_progress_callback(mut self, callback: impl Fn(f64) + 'w) -> Self {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    pub fn workflow(&self) -> &'w Workflow {
        self.workflow
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Fraction of blocks evaluated so far, clipped to `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let total = self.block_activated.len();
        if total == 0 {
            return 1.0;
        }
        let done = self.block_activated.iter().filter(|&&a| a).count();
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub fn activated_block_count(&self) -> usize {
        self.block_activated.iter().filter(|&&a| a).count()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// True when no further activation is possible: every remaining pipe and
    /// block is blocked on an unbound input (or the run failed).
    pub fn is_terminal(&self) -> bool {
        self.failed || (self.ready_pipes().is_empty() && self.next_ready_block().is_none())
    }

    /// The value bound to the workflow's designated output, once activated.
    pub fn output_value(&self) -> Option<SharedValue> {
        self.values.get(&self.workflow.output_id).cloned()
    }

    /// The value currently bound to a variable slot, if activated.
    pub fn value_of(&self, variable: crate::block::VariableRef) -> Option<SharedValue> {
        let id = self.workflow.id_of(variable)?;
        self.values.get(&id).cloned()
    }

    pub(crate) fn bound_variables(&self) -> impl Iterator<Item = (VarId, &SharedValue)> {
        self.values.iter().map(|(&id, value)| (id, value))
    }

    pub(crate) fn activation_flags(&self) -> (&[bool], &[bool]) {
        (&self.pipe_activated, &self.block_activated)
    }

    /// Binds additional workflow inputs (by positional index) between steps.
    /// Rebinding an already-activated input is an error.
    pub fn add_input_values(
        &mut self,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Result<(), RunError> {
        for (&index, value) in input_values {
            let Some(&id) = self.workflow.input_ids().get(index) else {
                return Err(RunError::UnknownInputIndex { index });
            };
            if self.variable_activated[id] {
                return Err(RunError::InputAlreadyBound { index });
            }
            self.bind(id, value.clone());
            self.log.push(format!("Input {} bound", index));
        }
        Ok(())
    }

    /// Binds the subset of `input_values` that feeds the given block's
    /// inputs; entries addressing other blocks' inputs are ignored.
    pub fn add_block_input_values(
        &mut self,
        block_index: usize,
        input_values: &AHashMap<usize, SharedValue>,
    ) -> Result<(), RunError> {
        if block_index >= self.workflow.blocks().len() {
            return Err(RunError::UnknownBlockIndex { index: block_index });
        }
        let mut filtered = AHashMap::new();
        for (&index, value) in input_values {
            let Some(origin) = self.workflow.input_origin(index) else {
                return Err(RunError::UnknownInputIndex { index });
            };
            if matches!(origin, crate::block::VariableRef::BlockInput { block, .. } if block == block_index)
            {
                filtered.insert(index, value.clone());
            }
        }
        self.add_input_values(&filtered)
    }

    /// Performs one evaluation step: propagates *all* currently-ready pipes,
    /// or, when no pipe is ready, evaluates the *single* next ready block
    /// in declaration order.
    pub fn advance(&mut self) -> Result<Advance, RunError> {
        let ready = self.ready_pipes();
        if !ready.is_empty() {
            let count = ready.len();
            for pipe in ready {
                let (source, target) = self.workflow.pipe_endpoints[pipe];
                let value = self.values[&source].clone();
                self.bind(target, value);
                self.pipe_activated[pipe] = true;
            }
            self.log.push(format!("Propagated {} pipe(s)", count));
            tracing::trace!(workflow = %self.workflow.name, count, "pipes propagated");
            return Ok(Advance::PipesPropagated(count));
        }
        if let Some(index) = self.next_ready_block() {
            self.evaluate_block(index)?;
            return Ok(Advance::BlockEvaluated(index));
        }
        Ok(Advance::Finished)
    }

    /// Propagates ready pipes, then evaluates the next ready block, if any.
    /// Returns the evaluated block's declaration index.
    pub fn evaluate_next_block(&mut self) -> Result<Option<usize>, RunError> {
        loop {
            match self.advance()? {
                Advance::PipesPropagated(_) => continue,
                Advance::BlockEvaluated(index) => return Ok(Some(index)),
                Advance::Finished => return Ok(None),
            }
        }
    }

    /// Drives the activation fixpoint to termination.
    pub fn continue_run(&mut self) -> Result<(), RunError> {
        while !matches!(self.advance()?, Advance::Finished) {}
        Ok(())
    }

    /// Freezes a terminal state into an immutable [`WorkflowRun`]. Fails if
    /// the designated output never activated.
    pub fn finalize(mut self) -> Result<WorkflowRun<'w>, RunError> {
        if !self.variable_activated[self.workflow.output_id] {
            return Err(RunError::UnreachableOutput {
                variable: self.workflow.output_variable().name.clone(),
            });
        }
        self.log.push(format!("Run of workflow '{}' complete", self.workflow.name));
        let output_value = self.values[&self.workflow.output_id].clone();
        Ok(WorkflowRun::new(
            self.workflow,
            self.values,
            self.log,
            output_value,
        ))
    }

    fn bind(&mut self, id: VarId, value: SharedValue) {
        self.values.insert(id, value);
        self.variable_activated[id] = true;
    }

    fn ready_pipes(&self) -> Vec<usize> {
        self.workflow
            .pipe_endpoints
            .iter()
            .enumerate()
            .filter(|&(pipe, &(source, _))| {
                !self.pipe_activated[pipe] && self.variable_activated[source]
            })
            .map(|(pipe, _)| pipe)
            .collect()
    }

    /// First unactivated block whose inputs are all activated, by
    /// declaration order. Declaration order, not graph order, decides ties;
    /// observable through block side effects.
    fn next_ready_block(&self) -> Option<usize> {
        if self.failed {
            return None;
        }
        (0..self.block_activated.len()).find(|&index| {
            !self.block_activated[index]
                && self.workflow.block_inputs[index]
                    .iter()
                    .all(|&id| self.variable_activated[id])
        })
    }

    fn evaluate_block(&mut self, index: usize) -> Result<(), RunError> {
        let block = &self.workflow.blocks()[index];
        let values: Vec<SharedValue> = self.workflow.block_inputs[index]
            .iter()
            .map(|id| self.values[id].clone())
            .collect();
        self.log
            .push(format!("Evaluating block {} ('{}')", index, block.name()));
        tracing::debug!(workflow = %self.workflow.name, block = %block.name(), kind = block.kind(), "evaluating block");

        let mut ctx = EvalContext {
            progress: self.progress_callback.as_deref(),
            log: &mut self.log,
        };
        let outputs = block.evaluate(&values, &mut ctx).and_then(|outputs| {
            if outputs.len() == block.outputs().len() {
                Ok(outputs)
            } else {
                Err(EvalError::OutputArity {
                    expected: block.outputs().len(),
                    produced: outputs.len(),
                })
            }
        });
        let outputs = match outputs {
            Ok(outputs) => outputs,
            Err(source) => {
                self.failed = true;
                self.log
                    .push(format!("Block {} ('{}') failed: {}", index, block.name(), source));
                tracing::warn!(workflow = %self.workflow.name, block = %block.name(), error = %source, "block evaluation failed");
                return Err(RunError::Block {
                    index,
                    name: block.name().to_string(),
                    source,
                });
            }
        };

        let output_ids = self.workflow.block_outputs[index].clone();
        for (id, value) in output_ids.into_iter().zip(outputs) {
            self.bind(id, value);
        }
        self.block_activated[index] = true;
        self.log
            .push(format!("Block {} ('{}') evaluated", index, block.name()));
        if let Some(callback) = &self.progress_callback {
            callback(self.progress());
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowState")
            .field("workflow", &self.workflow.name)
            .field("progress", &self.progress())
            .field("failed", &self.failed)
            .finish()
    }
}
