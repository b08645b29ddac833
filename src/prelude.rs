//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types of the nagare crate. Import this
//! module to assemble and run workflows without importing each type
//! individually.
//!
//! # Example
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//! use ahash::AHashMap;
//!
//! # fn run_example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ModelRegistry::new();
//! let mut builder = Workflow::builder("empty passthrough");
//! let variable = builder.add_variable(Variable::new("input"));
//! builder.output(variable);
//! let workflow = builder.build()?;
//!
//! let mut inputs = AHashMap::new();
//! inputs.insert(0, shared(Value::Int(1)));
//! let run = workflow.run(&inputs)?;
//! println!("{}", run.output_value().borrow());
//! # Ok(())
//! # }
//! ```

// Workflow assembly and evaluation
pub use crate::workflow::{
    Advance, BlockHandle, Pipe, Workflow, WorkflowBuilder, WorkflowRun, WorkflowState,
};

// Blocks and variable addressing
pub use crate::block::{
    Archive, Block, Concatenate, EvalContext, Export, ForEach, FunctionCall, InstantiateModel,
    ModelAttribute, ModelMethod, MultiPlot, Unpacker, Variable, VariableRef, WorkflowBlock,
};

// The reflection boundary
pub use crate::model::{
    FunctionSpec, MethodSpec, ModelClass, ModelInstance, ModelRegistry, Signature,
};

// Values
pub use crate::value::{SharedValue, Typing, Value, shared};

// Errors
pub use crate::error::{EvalError, ExchangeError, GraphError, RunError};

// Serialization and schema boundaries
pub use crate::exports::{ExportArtifact, ExportRequest, ExportWriter, PlotRenderer};
pub use crate::log::RunLog;
pub use crate::schema::InputSchema;
pub use crate::workflow::exchange::{
    WorkflowArtifact, WorkflowExchange, WorkflowRunExchange, WorkflowStateExchange,
};

// Collections used throughout the public API
pub use ahash::AHashMap;
