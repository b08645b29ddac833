//! End-to-end `run` behavior: defaults, ordering, aliasing, sinks, failures.
mod common;
use common::{demo_registry, int_of, with_recorder};
use nagare::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_run_merges_declared_defaults() {
    common::init_tracing();
    let registry = demo_registry();
    let workflow = common::generation_workflow(&registry);

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(5)));
    let run = workflow.run(&inputs).unwrap();

    let output = run.output_value().borrow();
    let Value::Sequence(models) = &*output else {
        panic!("expected a sequence, got {}", output);
    };
    assert_eq!(models.len(), 25);
    let first = models[0].borrow();
    let Value::Object(model) = &*first else {
        panic!("expected a Model object");
    };
    assert_eq!(int_of(&model.get("value").unwrap()).unwrap(), 5);
}

#[test]
fn test_explicit_inputs_override_defaults() {
    let registry = demo_registry();
    let workflow = common::generation_workflow(&registry);

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(5)));
    inputs.insert(1, shared(Value::Int(3)));
    inputs.insert(2, shared(Value::Str("demo".to_string())));
    let run = workflow.run(&inputs).unwrap();

    let output = run.output_value().borrow();
    let Value::Sequence(models) = &*output else {
        panic!("expected a sequence");
    };
    assert_eq!(models.len(), 3);
}

#[test]
fn test_missing_required_input_fails_fast() {
    let registry = demo_registry();
    let workflow = common::generation_workflow(&registry);

    // Only the two defaulted inputs can be covered.
    let result = workflow.run(&AHashMap::new());
    assert!(matches!(
        result,
        Err(RunError::ArityMismatch {
            expected: 3,
            provided: 2
        })
    ));

    let mut inputs = AHashMap::new();
    inputs.insert(5, shared(Value::Int(1)));
    assert!(matches!(
        workflow.run(&inputs),
        Err(RunError::UnknownInputIndex { index: 5 })
    ));
}

#[test]
fn test_simultaneously_ready_blocks_run_in_declaration_order() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let registry = with_recorder(
        with_recorder(demo_registry(), "first recorder", trace.clone()),
        "second recorder",
        trace.clone(),
    );

    let mut builder = Workflow::builder("ordering");
    let a = builder.add_block(Block::FunctionCall(
        FunctionCall::new(&registry, "first recorder", "record a").unwrap(),
    ));
    let b = builder.add_block(Block::FunctionCall(
        FunctionCall::new(&registry, "second recorder", "record b").unwrap(),
    ));
    let x = builder.add_variable(Variable::new("x"));
    builder.add_pipe(x, a.input(0));
    builder.add_pipe(x, b.input(0));
    builder.output(b.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(1)));
    workflow.run(&inputs).unwrap();

    assert_eq!(
        *trace.borrow(),
        vec!["first recorder".to_string(), "second recorder".to_string()]
    );
}

#[test]
fn test_method_mutation_is_visible_through_the_original_handle() {
    let registry = demo_registry();
    let mut builder = Workflow::builder("optimization");
    let instantiate = builder.add_block(Block::InstantiateModel(
        InstantiateModel::new(&registry, "Optimizer", "optimizer instantiation").unwrap(),
    ));
    let optimize = builder.add_block(Block::ModelMethod(
        ModelMethod::new(&registry, "Optimizer", "optimize", "optimization").unwrap(),
    ));
    builder.add_pipe(instantiate.output(0), optimize.input(0));
    builder.output(optimize.output(0));
    let workflow = builder.build().unwrap();

    let model = shared(Value::Object(
        ModelInstance::new("Model").with_field("value", Value::Int(10)),
    ));
    let mut inputs = AHashMap::new();
    inputs.insert(0, model.clone());
    // The `factor` parameter falls back to its declared default of 3.
    let run = workflow.run(&inputs).unwrap();

    assert_eq!(*run.output_value().borrow(), Value::Int(13));
    // The caller's own handle observed the in-place mutation.
    let model = model.borrow();
    let Value::Object(instance) = &*model else {
        panic!("expected the Model object");
    };
    assert_eq!(int_of(&instance.get("value").unwrap()).unwrap(), 13);

    // The re-emitted receiver is the same allocation as the constructed one.
    let receiver_in = run.value_of(instantiate.output(0)).unwrap();
    let receiver_out = run.value_of(optimize.output(1)).unwrap();
    assert!(Rc::ptr_eq(&receiver_in, &receiver_out));
}

#[test]
fn test_attribute_paths_walk_objects_and_sequences() {
    let registry = demo_registry();
    let mut builder = Workflow::builder("attribute read");
    let instantiate = builder.add_block(Block::InstantiateModel(
        InstantiateModel::new(&registry, "Generator", "generator instantiation").unwrap(),
    ));
    let generate = builder.add_block(Block::ModelMethod(
        ModelMethod::new(&registry, "Generator", "generate", "model generation").unwrap(),
    ));
    let attribute = builder.add_block(Block::ModelAttribute(ModelAttribute::new(
        "models/0/value",
        "first model value",
    )));
    builder.add_pipe(instantiate.output(0), generate.input(0));
    builder.add_pipe(generate.output(1), attribute.input(0));
    builder.output(attribute.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(7)));
    inputs.insert(1, shared(Value::Int(4)));
    inputs.insert(2, shared(Value::Str(String::new())));
    let run = workflow.run(&inputs).unwrap();
    assert_eq!(*run.output_value().borrow(), Value::Int(7));
}

#[test]
fn test_missing_attribute_aborts_the_run() {
    let registry = demo_registry();
    let mut builder = Workflow::builder("bad attribute");
    let attribute = builder.add_block(Block::ModelAttribute(ModelAttribute::new(
        "no_such_field",
        "broken read",
    )));
    builder.output(attribute.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Object(ModelInstance::new("Model"))));
    let result = workflow.run(&inputs);
    assert!(matches!(
        result,
        Err(RunError::Block {
            index: 0,
            source: EvalError::AttributeNotFound { .. },
            ..
        })
    ));
}

#[test]
fn test_concatenate_preserves_order() {
    let mut builder = Workflow::builder("concatenation");
    let concat = builder.add_block(Block::Concatenate(Concatenate::new(2, "joined")));
    builder.output(concat.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(
        0,
        shared(Value::sequence([Value::Int(1), Value::Int(2)])),
    );
    inputs.insert(1, shared(Value::sequence([Value::Int(3)])));
    let run = workflow.run(&inputs).unwrap();

    let output = run.output_value().borrow();
    let Value::Sequence(items) = &*output else {
        panic!("expected a sequence");
    };
    let values: Vec<_> = items.iter().map(|i| i.borrow().clone()).collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_unpacker_shares_element_handles() {
    let mut builder = Workflow::builder("unpacking");
    let unpack = builder.add_block(Block::Unpacker(Unpacker::new(vec![2, 0], "picked")));
    builder.output(unpack.output(0));
    let workflow = builder.build().unwrap();

    let sequence = shared(Value::sequence([
        Value::Int(10),
        Value::Int(11),
        Value::Int(12),
    ]));
    let mut inputs = AHashMap::new();
    inputs.insert(0, sequence.clone());
    let run = workflow.run(&inputs).unwrap();

    assert_eq!(*run.output_value().borrow(), Value::Int(12));
    assert_eq!(
        *run.value_of(unpack.output(1)).unwrap().borrow(),
        Value::Int(10)
    );

    // Extracted elements alias the source sequence, they are not copies.
    let source = sequence.borrow();
    let Value::Sequence(items) = &*source else {
        panic!("expected the source sequence");
    };
    assert!(Rc::ptr_eq(&items[2], run.output_value()));
}

#[test]
fn test_unpacker_rejects_out_of_range_indices() {
    let mut builder = Workflow::builder("unpacking");
    let unpack = builder.add_block(Block::Unpacker(Unpacker::new(vec![9], "picked")));
    builder.output(unpack.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::sequence([Value::Int(1)])));
    assert!(matches!(
        workflow.run(&inputs),
        Err(RunError::Block {
            source: EvalError::IndexOutOfRange { index: 9, length: 1 },
            ..
        })
    ));
}

#[test]
fn test_foreach_maps_the_nested_workflow_over_a_sequence() {
    let registry = demo_registry();
    let inner = Rc::new(common::addition_workflow(&registry));
    let wrapped = WorkflowBlock::new(inner, "wrapped addition");

    let mut builder = Workflow::builder("mapping");
    let foreach = builder.add_block(Block::ForEach(
        ForEach::new(wrapped, 0, "add to each").unwrap(),
    ));
    builder.output(foreach.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(
        0,
        shared(Value::sequence([Value::Int(1), Value::Int(2), Value::Int(3)])),
    );
    inputs.insert(1, shared(Value::Int(10)));
    let run = workflow.run(&inputs).unwrap();

    let output = run.output_value().borrow();
    let Value::Sequence(items) = &*output else {
        panic!("expected a sequence");
    };
    let values: Vec<_> = items.iter().map(|i| i.borrow().clone()).collect();
    assert_eq!(values, vec![Value::Int(11), Value::Int(12), Value::Int(13)]);
}

#[test]
fn test_foreach_over_an_empty_sequence_never_runs_the_inner_workflow() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let registry = with_recorder(demo_registry(), "inner recorder", trace.clone());

    let mut inner = Workflow::builder("traced inner");
    let record = inner.add_block(Block::FunctionCall(
        FunctionCall::new(&registry, "inner recorder", "record").unwrap(),
    ));
    inner.output(record.output(0));
    let inner = Rc::new(inner.build().unwrap());

    let mut builder = Workflow::builder("empty mapping");
    let foreach = builder.add_block(Block::ForEach(
        ForEach::new(WorkflowBlock::new(inner, "traced"), 0, "map").unwrap(),
    ));
    builder.output(foreach.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Sequence(Vec::new())));
    let run = workflow.run(&inputs).unwrap();

    assert_eq!(*run.output_value().borrow(), Value::Sequence(Vec::new()));
    assert!(trace.borrow().is_empty());
}

#[test]
fn test_nested_workflow_failure_names_the_inner_workflow() {
    let registry = demo_registry().with_function(FunctionSpec::new(
        "explode",
        Signature::new().param("x", Typing::Any),
        |_| Err(EvalError::User("boom".to_string())),
    ));

    let mut inner = Workflow::builder("inner failure");
    let explode = inner.add_block(Block::FunctionCall(
        FunctionCall::new(&registry, "explode", "exploding call").unwrap(),
    ));
    inner.output(explode.output(0));
    let inner = Rc::new(inner.build().unwrap());

    let mut builder = Workflow::builder("outer");
    let nested = builder.add_block(Block::WorkflowBlock(WorkflowBlock::new(inner, "nested")));
    builder.output(nested.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(1)));
    let result = workflow.run(&inputs);
    match result {
        Err(RunError::Block {
            source: EvalError::Nested { workflow, .. },
            ..
        }) => assert_eq!(workflow, "inner failure"),
        other => panic!("expected a nested failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_block_failure_reports_index_and_name() {
    let registry = demo_registry().with_function(FunctionSpec::new(
        "explode",
        Signature::new().param("x", Typing::Any),
        |_| Err(EvalError::User("boom".to_string())),
    ));

    let mut builder = Workflow::builder("failing");
    let explode = builder.add_block(Block::FunctionCall(
        FunctionCall::new(&registry, "explode", "exploding call").unwrap(),
    ));
    builder.output(explode.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(1)));
    match workflow.run(&inputs) {
        Err(RunError::Block { index, name, source }) => {
            assert_eq!(index, 0);
            assert_eq!(name, "exploding call");
            assert!(matches!(source, EvalError::User(_)));
        }
        other => panic!("expected a block failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_export_emits_an_artifact_marker() {
    let registry = demo_registry();
    let mut builder = Workflow::builder("export");
    let export = builder.add_block(Block::Export(
        Export::new(
            &registry,
            "json",
            ExportRequest {
                export_name: "model dump".to_string(),
                extension: "json".to_string(),
                text: true,
            },
            "json export",
        )
        .unwrap(),
    ));
    builder.output(export.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(
        0,
        shared(Value::Object(
            ModelInstance::new("Model").with_field("value", Value::Int(1)),
        )),
    );
    let run = workflow.run(&inputs).unwrap();

    let output = run.output_value().borrow();
    let Value::Artifact(artifact) = &*output else {
        panic!("expected an artifact");
    };
    assert_eq!(artifact.export_name, "model dump");
    assert_eq!(artifact.extension, "json");
    assert!(artifact.text);
}

#[test]
fn test_archive_bundles_artifacts_and_rejects_other_values() {
    let registry = demo_registry();
    let request = ExportRequest {
        export_name: "dump".to_string(),
        extension: "json".to_string(),
        text: true,
    };

    let mut builder = Workflow::builder("archiving");
    let first = builder.add_block(Block::Export(
        Export::new(&registry, "json", request.clone(), "first export").unwrap(),
    ));
    let second = builder.add_block(Block::Export(
        Export::new(&registry, "json", request, "second export").unwrap(),
    ));
    let archive = builder.add_block(Block::Archive(Archive::new(2, "bundle")));
    let model = builder.add_variable(Variable::new("model"));
    builder.add_pipe(model, first.input(0));
    builder.add_pipe(model, second.input(0));
    builder.add_pipe(first.output(0), archive.input(0));
    builder.add_pipe(second.output(0), archive.input(1));
    builder.output(archive.output(0));
    let workflow = builder.build().unwrap();

    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Object(ModelInstance::new("Model"))));
    let run = workflow.run(&inputs).unwrap();
    let output = run.output_value().borrow();
    let Value::Artifact(artifact) = &*output else {
        panic!("expected an artifact");
    };
    assert_eq!(artifact.extension, "zip");
    drop(output);

    // A non-artifact input is a type error, not a silent skip.
    let mut builder = Workflow::builder("bad archive");
    let archive = builder.add_block(Block::Archive(Archive::new(1, "bundle")));
    builder.output(archive.output(0));
    let workflow = builder.build().unwrap();
    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Int(1)));
    assert!(matches!(
        workflow.run(&inputs),
        Err(RunError::Block {
            source: EvalError::TypeMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_multiplot_samples_attributes_per_object() {
    let registry = demo_registry();
    let mut builder = Workflow::builder("plotting");
    let plot = builder.add_block(Block::MultiPlot(
        MultiPlot::new(&registry, vec!["value".to_string()], "scatter").unwrap(),
    ));
    builder.output(plot.output(0));
    let workflow = builder.build().unwrap();

    let objects = (0..3)
        .map(|i| {
            shared(Value::Object(
                ModelInstance::new("Model").with_field("value", Value::Int(i)),
            ))
        })
        .collect();
    let mut inputs = AHashMap::new();
    inputs.insert(0, shared(Value::Sequence(objects)));
    let run = workflow.run(&inputs).unwrap();

    // The default renderer yields an opaque marker.
    let output = run.output_value().borrow();
    let Value::Artifact(artifact) = &*output else {
        panic!("expected a display marker");
    };
    assert_eq!(artifact.export_name, "multiplot");

    // An object missing the sampled attribute fails the block.
    let mut inputs = AHashMap::new();
    inputs.insert(
        0,
        shared(Value::sequence([Value::Object(ModelInstance::new("Model"))])),
    );
    assert!(matches!(
        workflow.run(&inputs),
        Err(RunError::Block {
            source: EvalError::AttributeNotFound { .. },
            ..
        })
    ));
}
