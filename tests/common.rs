//! Common test utilities: a model registry and demo workflows.
use nagare::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Installs the env-filtered log subscriber once per test binary. Run with
/// `RUST_LOG=nagare=trace` to see the evaluation events.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Reads an `Int` out of a shared handle.
#[allow(dead_code)]
pub fn int_of(value: &SharedValue) -> Result<i64, EvalError> {
    match &*value.borrow() {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::TypeMismatch {
            operation: "test helper".to_string(),
            expected: "Int".to_string(),
            found: other.kind().to_string(),
        }),
    }
}

/// Creates a registry with the demo model classes used across the tests.
///
/// - `Generator(parameter, nb_solutions = 25, name = "")` with a `generate`
///   method that fills the `models` field with `Model` objects valued
///   `parameter + i` and returns them as a sequence.
/// - `Optimizer(model_to_optimize)` with an `optimize(factor = 3)` method
///   that mutates the model's `value` in place and returns the new value.
/// - A free function `add(a, b)`.
#[allow(dead_code)]
pub fn demo_registry() -> ModelRegistry {
    let generator = ModelClass::new(
        "Generator",
        Signature::new()
            .param("parameter", Typing::Int)
            .param_with_default("nb_solutions", Typing::Int, Value::Int(25))
            .param_with_default("name", Typing::Str, Value::Str(String::new())),
        |values| {
            let instance = ModelInstance::new("Generator")
                .with_field("parameter", values[0].borrow().clone())
                .with_field("nb_solutions", values[1].borrow().clone())
                .with_field("name", values[2].borrow().clone())
                .with_field("models", Value::Null);
            Ok(Value::Object(instance))
        },
    )
    .with_method(MethodSpec::new(
        "generate",
        Signature::new(),
        |receiver, _args, ctx| {
            let (parameter, count) = {
                let receiver = receiver.borrow();
                let Value::Object(instance) = &*receiver else {
                    return Err(EvalError::User("generate expects a Generator".to_string()));
                };
                let parameter = int_of(&instance.get("parameter").unwrap())?;
                let count = int_of(&instance.get("nb_solutions").unwrap())?;
                (parameter, count)
            };
            let models: Vec<SharedValue> = (0..count)
                .map(|i| {
                    ctx.report_progress(i as f64 / count as f64);
                    shared(Value::Object(
                        ModelInstance::new("Model").with_field("value", Value::Int(parameter + i)),
                    ))
                })
                .collect();
            let models = Value::Sequence(models);
            if let Value::Object(instance) = &mut *receiver.borrow_mut() {
                instance.set("models", shared(models.clone()));
            }
            Ok(models)
        },
    ));

    let optimizer = ModelClass::new(
        "Optimizer",
        Signature::new().param("model_to_optimize", Typing::Class("Model".to_string())),
        |values| {
            // Alias the wrapped model's handle, never copy it.
            let mut instance = ModelInstance::new("Optimizer");
            instance.set("model", values[0].clone());
            Ok(Value::Object(instance))
        },
    )
    .with_method(MethodSpec::new(
        "optimize",
        Signature::new().param_with_default("factor", Typing::Int, Value::Int(3)),
        |receiver, args, _ctx| {
            let model = {
                let receiver = receiver.borrow();
                let Value::Object(instance) = &*receiver else {
                    return Err(EvalError::User("optimize expects an Optimizer".to_string()));
                };
                instance.get("model").unwrap()
            };
            let factor = int_of(&args[0])?;
            let model = model.borrow();
            let Value::Object(instance) = &*model else {
                return Err(EvalError::User("optimize expects a wrapped Model".to_string()));
            };
            let slot = instance.get("value").unwrap();
            let updated = int_of(&slot)? + factor;
            *slot.borrow_mut() = Value::Int(updated);
            Ok(Value::Int(updated))
        },
    ));

    let add = FunctionSpec::new(
        "add",
        Signature::new()
            .param("a", Typing::Int)
            .param("b", Typing::Int),
        |values| Ok(Value::Int(int_of(&values[0])? + int_of(&values[1])?)),
    );

    ModelRegistry::new()
        .with_class(generator)
        .with_class(optimizer)
        .with_function(add)
}

/// Adds a function that appends `label` to `trace` each time it runs and
/// returns its single input unchanged. Used to observe evaluation order.
#[allow(dead_code)]
pub fn with_recorder(
    registry: ModelRegistry,
    label: &str,
    trace: Rc<RefCell<Vec<String>>>,
) -> ModelRegistry {
    let label = label.to_string();
    registry.with_function(FunctionSpec::new(
        label.clone(),
        Signature::new().param("x", Typing::Any),
        move |values| {
            trace.borrow_mut().push(label.clone());
            Ok(values[0].borrow().clone())
        },
    ))
}

/// Generator instantiation piped into its `generate` method. The output is
/// the generated model sequence. Inputs: `parameter`, then the defaulted
/// `nb_solutions` and `name`.
#[allow(dead_code)]
pub fn generation_workflow(registry: &ModelRegistry) -> Workflow {
    let mut builder = Workflow::builder("generation");
    let instantiate = builder.add_block(Block::InstantiateModel(
        InstantiateModel::new(registry, "Generator", "generator instantiation").unwrap(),
    ));
    let generate = builder.add_block(Block::ModelMethod(
        ModelMethod::new(registry, "Generator", "generate", "model generation").unwrap(),
    ));
    builder.add_pipe(instantiate.output(0), generate.input(0));
    builder.output(generate.output(0));
    builder.build().unwrap()
}

/// Single `add` call wrapped as a workflow, for nesting tests.
#[allow(dead_code)]
pub fn addition_workflow(registry: &ModelRegistry) -> Workflow {
    let mut builder = Workflow::builder("addition");
    let add = builder.add_block(Block::FunctionCall(
        FunctionCall::new(registry, "add", "sum").unwrap(),
    ));
    builder.output(add.output(0));
    builder.build().unwrap()
}
