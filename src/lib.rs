//! # Nagare - Dataflow Workflow Execution Engine
//!
//! **Nagare** is a dataflow execution engine for user-assembled workflows:
//! directed acyclic graphs of typed blocks connected by pipes. A workflow is
//! assembled declaratively, validated once, and then run either in one shot
//! or stepwise, with value activation propagating through the graph until a
//! fixpoint is reached.
//!
//! ## Core Workflow
//!
//! The engine never reflects over user code at run time. Everything it may
//! call is registered up front:
//!
//! 1.  **Register Your Models**: Declare model classes, their constructors,
//!     methods and free functions on a [`ModelRegistry`](model::ModelRegistry)
//!     with explicit, immutable signatures.
//! 2.  **Assemble a Workflow**: Use [`Workflow::builder`](workflow::Workflow::builder)
//!     to add blocks, wire pipes between variable slots and designate the
//!     output. `build` validates the graph (dangling pipes, duplicate
//!     targets, cycles) and fixes the positional input order.
//! 3.  **Run**: Call [`run`](workflow::Workflow::run) for a one-shot
//!     evaluation, or [`start_run`](workflow::Workflow::start_run) to drive
//!     the run step by step, injecting inputs between steps.
//! 4.  **Inspect**: The resulting [`WorkflowRun`](workflow::WorkflowRun)
//!     holds every bound value, the log and the output; workflows, states and
//!     runs all convert to plain exchange structures for serialization.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//! use ahash::AHashMap;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Register a model class with a constructor and one method.
//!     let registry = ModelRegistry::new().with_class(
//!         ModelClass::new(
//!             "Counter",
//!             Signature::new().param("start", Typing::Int),
//!             |values| {
//!                 let start = values[0].borrow().clone();
//!                 Ok(Value::Object(
//!                     ModelInstance::new("Counter").with_field("count", start),
//!                 ))
//!             },
//!         )
//!         .with_method(MethodSpec::new(
//!             "double",
//!             Signature::new(),
//!             |receiver, _args, _ctx| {
//!                 let receiver = receiver.borrow();
//!                 let Value::Object(instance) = &*receiver else {
//!                     return Err(EvalError::User("expected an object".to_string()));
//!                 };
//!                 match &*instance.get("count").unwrap().borrow() {
//!                     Value::Int(count) => Ok(Value::Int(count * 2)),
//!                     other => Err(EvalError::User(format!("bad count: {}", other))),
//!                 }
//!             },
//!         )),
//!     );
//!
//!     // 2. Assemble the workflow: instantiate, then call the method.
//!     let mut builder = Workflow::builder("doubler");
//!     let counter = builder.add_block(Block::InstantiateModel(InstantiateModel::new(
//!         &registry, "Counter", "make counter",
//!     )?));
//!     let double = builder.add_block(Block::ModelMethod(ModelMethod::new(
//!         &registry, "Counter", "double", "double count",
//!     )?));
//!     builder.add_pipe(counter.output(0), double.input(0));
//!     builder.output(double.output(0));
//!     let workflow = builder.build()?;
//!
//!     // 3. Run it against positional inputs.
//!     let mut inputs = AHashMap::new();
//!     inputs.insert(0, shared(Value::Int(21)));
//!     let run = workflow.run(&inputs)?;
//!
//!     println!("-> Output: {}", run.output_value().borrow());
//!     Ok(())
//! }
//! ```

pub mod block;
pub mod error;
pub mod exports;
pub mod log;
pub mod model;
pub mod prelude;
pub mod schema;
pub mod value;
pub mod workflow;
