use super::{VarId, Workflow};
use crate::block::VariableRef;
use crate::log::RunLog;
use crate::value::SharedValue;
use ahash::AHashMap;

/// Immutable snapshot of a completed run: the workflow it came from, every
/// bound value, the execution log and the final output value. Never mutated
/// after creation.
pub struct WorkflowRun<'w> {
    workflow: &'w Workflow,
    values: AHashMap<VarId, SharedValue>,
    log: RunLog,
    output_value: SharedValue,
}

impl<'w> WorkflowRun<'w> {
    pub(crate) fn new(
        workflow: &'w Workflow,
        values: AHashMap<VarId, SharedValue>,
        log: RunLog,
        output_value: SharedValue,
    ) -> Self {
        Self {
            workflow,
            values,
            log,
            output_value,
        }
    }

    pub fn workflow(&self) -> &'w Workflow {
        self.workflow
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// The value bound to the workflow's designated output.
    pub fn output_value(&self) -> &SharedValue {
        &self.output_value
    }

    /// The value a variable slot ended up bound to, if it was activated.
    pub fn value_of(&self, variable: VariableRef) -> Option<SharedValue> {
        let id = self.workflow.id_of(variable)?;
        self.values.get(&id).cloned()
    }

    pub(crate) fn bound_variables(&self) -> impl Iterator<Item = (VarId, &SharedValue)> {
        self.values.iter().map(|(&id, value)| (id, value))
    }
}

impl std::fmt::Debug for WorkflowRun<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRun")
            .field("workflow", &self.workflow.name)
            .field("bound_variables", &self.values.len())
            .finish()
    }
}
