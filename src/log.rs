use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered textual record of the evaluation events of one run.
///
/// Every pipe propagation, block evaluation and failure appends one entry.
/// The log travels with the [`WorkflowState`](crate::workflow::WorkflowState)
/// while the run is in progress and is frozen into the final
/// [`WorkflowRun`](crate::workflow::WorkflowRun).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    entries: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
