use thiserror::Error;

/// Errors raised while assembling a workflow graph. These can only occur at
/// construction time; a successfully built [`Workflow`](crate::workflow::Workflow)
/// never raises them during a run.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Pipe {pipe_index} references a source variable that does not exist")]
    DanglingPipeSource { pipe_index: usize },

    #[error("Pipe {pipe_index} references a target variable that does not exist")]
    DanglingPipeTarget { pipe_index: usize },

    #[error(
        "Pipe {pipe_index} uses another block's input slot as its source; only block outputs and free variables can feed a pipe"
    )]
    InvalidPipeSource { pipe_index: usize },

    #[error("Pipe {pipe_index} targets a non-input variable; pipes may only feed block inputs")]
    InvalidPipeTarget { pipe_index: usize },

    #[error("Variable '{variable}' is the target of more than one pipe")]
    DuplicatePipeTarget { variable: String },

    #[error("The dependency graph contains a cycle through variable '{variable}'")]
    CyclicDependency { variable: String },

    #[error("The designated output variable does not exist in this workflow")]
    DanglingOutput,

    #[error(
        "ForEach iteration input index {index} is out of range for a wrapped block with {arity} inputs"
    )]
    InvalidIterInput { index: usize, arity: usize },

    #[error("Model class '{class}' is not registered")]
    UnknownClass { class: String },

    #[error("Method '{method}' is not registered on model class '{class}'")]
    UnknownMethod { class: String, method: String },

    #[error("Function '{function}' is not registered")]
    UnknownFunction { function: String },

    #[error("No export writer registered for format '{format}'")]
    UnknownWriter { format: String },

    #[error("No plot renderer registered under '{name}'")]
    UnknownRenderer { name: String },

    #[error("Malformed exchange representation: {0}")]
    MalformedExchange(String),
}

/// Errors raised while driving a run to completion.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Workflow expects {expected} input values, but only {provided} were provided or defaulted")]
    ArityMismatch { expected: usize, provided: usize },

    #[error("Input index {index} is out of range for this workflow")]
    UnknownInputIndex { index: usize },

    #[error("Input index {index} is already bound in this run")]
    InputAlreadyBound { index: usize },

    #[error("Block index {index} is out of range for this workflow")]
    UnknownBlockIndex { index: usize },

    #[error("Evaluation terminated without activating the output variable '{variable}'")]
    UnreachableOutput { variable: String },

    #[error("Block {index} ('{name}') failed to evaluate: {source}")]
    Block {
        index: usize,
        name: String,
        #[source]
        source: EvalError,
    },
}

/// Value-level errors produced inside a block body or by user-registered
/// callables. These abort the surrounding run, wrapped in [`RunError::Block`].
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("Type mismatch during '{operation}': expected {expected}, but found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("Object of class '{class}' has no attribute '{attribute}'")]
    AttributeNotFound { class: String, attribute: String },

    #[error("Index {index} is out of range for a sequence of length {length}")]
    IndexOutOfRange { index: usize, length: usize },

    #[error("Block produced {produced} output values, but declares {expected} outputs")]
    OutputArity { expected: usize, produced: usize },

    #[error("Nested workflow '{workflow}' failed: {message}")]
    Nested { workflow: String, message: String },

    #[error("{0}")]
    User(String),
}

/// Errors raised by the exchange-tree representation and the on-disk
/// artifact format.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Malformed exchange tree: {0}")]
    Malformed(String),

    #[error("Exchange tree references unknown object id {0}")]
    UnknownReference(u64),

    #[error("Serialization failed: {0}")]
    Encode(String),

    #[error("Deserialization failed: {0}")]
    Decode(String),

    #[error("File access failed: {0}")]
    Io(String),
}
