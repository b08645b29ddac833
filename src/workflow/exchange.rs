//! Exchange-tree representation of workflows, states and runs.
//!
//! The engine presents its blocks, pipes and variables as plain-attribute
//! structs an external serializer can drive. Runtime values are encoded as
//! trees of JSON primitives with `$id`/`$ref` cross-reference markers:
//! shared handles are registered in an identity-keyed table built once per
//! encode call, so aliased values round-trip as one object, never as copies.

use super::{Pipe, Workflow, WorkflowBuilder, WorkflowRun, WorkflowState};
use crate::block::{
    Archive, Block, Concatenate, Export, ForEach, FunctionCall, InstantiateModel, ModelAttribute,
    ModelMethod, MultiPlot, Unpacker, Variable, VariableRef, WorkflowBlock,
};
use crate::error::{ExchangeError, GraphError};
use crate::exports::{ExportArtifact, ExportRequest};
use crate::log::RunLog;
use crate::model::{ModelInstance, ModelRegistry};
use crate::schema::InputSchema;
use crate::value::{SharedValue, Typing, Value, shared};
use ahash::AHashMap;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::io::{Read, Write};
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Value trees

/// Encodes shared values into JSON trees, deduplicating by handle identity.
struct TreeEncoder {
    table: AHashMap<usize, u64>,
    next_id: u64,
}

impl TreeEncoder {
    fn new() -> Self {
        Self {
            table: AHashMap::new(),
            next_id: 0,
        }
    }

    fn encode(&mut self, value: &SharedValue) -> serde_json::Value {
        let ptr = Rc::as_ptr(value) as usize;
        if let Some(&id) = self.table.get(&ptr) {
            return json!({ "$ref": id });
        }
        match &*value.borrow() {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Str(s) => json!(s),
            Value::Sequence(items) => {
                // Register before recursing so self-referential sequences
                // terminate as a `$ref`.
                let id = self.register(ptr);
                let items: Vec<_> = items.iter().map(|item| self.encode(item)).collect();
                json!({ "$id": id, "$sequence": items })
            }
            Value::Object(instance) => {
                let id = self.register(ptr);
                let mut fields = serde_json::Map::new();
                // Deterministic field order.
                for name in instance.field_names().map(String::from).sorted() {
                    if let Some(field) = instance.get(&name) {
                        fields.insert(name, self.encode(&field));
                    }
                }
                json!({ "$id": id, "$class": instance.class, "$fields": fields })
            }
            Value::Artifact(artifact) => json!({ "$artifact": artifact }),
        }
    }

    fn register(&mut self, ptr: usize) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.table.insert(ptr, id);
        id
    }
}

/// Decodes JSON trees back into shared values, resolving `$ref` markers
/// against the ids seen so far.
struct TreeDecoder {
    table: AHashMap<u64, SharedValue>,
}

impl TreeDecoder {
    fn new() -> Self {
        Self {
            table: AHashMap::new(),
        }
    }

    fn decode(&mut self, tree: &serde_json::Value) -> Result<SharedValue, ExchangeError> {
        match tree {
            serde_json::Value::Null => Ok(shared(Value::Null)),
            serde_json::Value::Bool(b) => Ok(shared(Value::Bool(*b))),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(shared(Value::Int(i)))
                } else {
                    Ok(shared(Value::Float(n.as_f64().ok_or_else(|| {
                        ExchangeError::Malformed(format!("unrepresentable number {}", n))
                    })?)))
                }
            }
            serde_json::Value::String(s) => Ok(shared(Value::Str(s.clone()))),
            serde_json::Value::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.decode(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(shared(Value::Sequence(items)))
            }
            serde_json::Value::Object(map) => self.decode_object(map),
        }
    }

    fn decode_object(
        &mut self,
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SharedValue, ExchangeError> {
        if let Some(reference) = map.get("$ref") {
            let id = reference
                .as_u64()
                .ok_or_else(|| ExchangeError::Malformed("non-numeric $ref".to_string()))?;
            return self
                .table
                .get(&id)
                .cloned()
                .ok_or(ExchangeError::UnknownReference(id));
        }
        if let Some(artifact) = map.get("$artifact") {
            let artifact: ExportArtifact = serde_json::from_value(artifact.clone())
                .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
            return Ok(shared(Value::Artifact(artifact)));
        }

        // Compound values: allocate the handle first so cyclic references
        // inside resolve to it.
        let handle = shared(Value::Null);
        if let Some(id) = map.get("$id").and_then(serde_json::Value::as_u64) {
            self.table.insert(id, handle.clone());
        }
        if let Some(items) = map.get("$sequence") {
            let items = items
                .as_array()
                .ok_or_else(|| ExchangeError::Malformed("$sequence is not an array".to_string()))?
                .iter()
                .map(|item| self.decode(item))
                .collect::<Result<Vec<_>, _>>()?;
            *handle.borrow_mut() = Value::Sequence(items);
            return Ok(handle);
        }
        if let Some(class) = map.get("$class") {
            let class = class
                .as_str()
                .ok_or_else(|| ExchangeError::Malformed("$class is not a string".to_string()))?;
            let mut instance = ModelInstance::new(class);
            if let Some(fields) = map.get("$fields").and_then(serde_json::Value::as_object) {
                for (name, field) in fields {
                    instance.set(name.clone(), self.decode(field)?);
                }
            }
            *handle.borrow_mut() = Value::Object(instance);
            return Ok(handle);
        }
        Err(ExchangeError::Malformed(
            "object carries none of $ref/$artifact/$sequence/$class".to_string(),
        ))
    }
}

/// Encodes one value as a standalone exchange tree.
pub fn value_to_tree(value: &SharedValue) -> serde_json::Value {
    TreeEncoder::new().encode(value)
}

/// Decodes one standalone exchange tree.
pub fn value_from_tree(tree: &serde_json::Value) -> Result<SharedValue, ExchangeError> {
    TreeDecoder::new().decode(tree)
}

// ---------------------------------------------------------------------------
// Workflow structure

/// Plain-attribute form of a [`Variable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableExchange {
    pub name: String,
    pub typing: Typing,
    pub default: Option<serde_json::Value>,
}

fn variable_to_exchange(variable: &Variable) -> VariableExchange {
    VariableExchange {
        name: variable.name.clone(),
        typing: variable.typing.clone(),
        default: variable
            .default
            .as_ref()
            .map(|d| value_to_tree(&shared(d.clone()))),
    }
}

fn variable_from_exchange(exchange: &VariableExchange) -> Result<Variable, GraphError> {
    let default = match &exchange.default {
        Some(tree) => Some(
            value_from_tree(tree)
                .map_err(|e| GraphError::MalformedExchange(e.to_string()))?
                .borrow()
                .clone(),
        ),
        None => None,
    };
    Ok(Variable {
        name: exchange.name.clone(),
        typing: exchange.typing.clone(),
        default,
    })
}

/// Plain-attribute form of a [`Block`]: variant tag plus the construction
/// configuration, enough to rebuild the block against a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BlockExchange {
    InstantiateModel {
        name: String,
        class: String,
    },
    ModelMethod {
        name: String,
        class: String,
        method: String,
    },
    ModelAttribute {
        name: String,
        attribute: String,
    },
    FunctionCall {
        name: String,
        function: String,
    },
    Concatenate {
        name: String,
        parts: usize,
    },
    Unpacker {
        name: String,
        indices: Vec<usize>,
    },
    WorkflowBlock {
        name: String,
        workflow: WorkflowExchange,
    },
    ForEach {
        name: String,
        block_name: String,
        workflow: WorkflowExchange,
        iter_input_index: usize,
    },
    Export {
        name: String,
        format: String,
        export_name: String,
        extension: String,
        text: bool,
    },
    Archive {
        name: String,
        parts: usize,
    },
    MultiPlot {
        name: String,
        attributes: Vec<String>,
    },
}

fn block_to_exchange(block: &Block) -> BlockExchange {
    match block {
        Block::InstantiateModel(b) => BlockExchange::InstantiateModel {
            name: b.name.clone(),
            class: b.class.clone(),
        },
        Block::ModelMethod(b) => BlockExchange::ModelMethod {
            name: b.name.clone(),
            class: b.class.clone(),
            method: b.method.clone(),
        },
        Block::ModelAttribute(b) => BlockExchange::ModelAttribute {
            name: b.name.clone(),
            attribute: b.attribute.clone(),
        },
        Block::FunctionCall(b) => BlockExchange::FunctionCall {
            name: b.name.clone(),
            function: b.function.clone(),
        },
        Block::Concatenate(b) => BlockExchange::Concatenate {
            name: b.name.clone(),
            parts: b.parts,
        },
        Block::Unpacker(b) => BlockExchange::Unpacker {
            name: b.name.clone(),
            indices: b.indices.clone(),
        },
        Block::WorkflowBlock(b) => BlockExchange::WorkflowBlock {
            name: b.name.clone(),
            workflow: b.workflow.to_exchange(),
        },
        Block::ForEach(b) => BlockExchange::ForEach {
            name: b.name.clone(),
            block_name: b.workflow_block.name.clone(),
            workflow: b.workflow_block.workflow.to_exchange(),
            iter_input_index: b.iter_input_index,
        },
        Block::Export(b) => BlockExchange::Export {
            name: b.name.clone(),
            format: b.format.clone(),
            export_name: b.request.export_name.clone(),
            extension: b.request.extension.clone(),
            text: b.request.text,
        },
        Block::Archive(b) => BlockExchange::Archive {
            name: b.name.clone(),
            parts: b.parts,
        },
        Block::MultiPlot(b) => BlockExchange::MultiPlot {
            name: b.name.clone(),
            attributes: b.attributes.clone(),
        },
    }
}

fn block_from_exchange(
    exchange: &BlockExchange,
    registry: &ModelRegistry,
) -> Result<Block, GraphError> {
    Ok(match exchange {
        BlockExchange::InstantiateModel { name, class } => {
            Block::InstantiateModel(InstantiateModel::new(registry, class, name.clone())?)
        }
        BlockExchange::ModelMethod {
            name,
            class,
            method,
        } => Block::ModelMethod(ModelMethod::new(registry, class, method, name.clone())?),
        BlockExchange::ModelAttribute { name, attribute } => {
            Block::ModelAttribute(ModelAttribute::new(attribute.clone(), name.clone()))
        }
        BlockExchange::FunctionCall { name, function } => {
            Block::FunctionCall(FunctionCall::new(registry, function, name.clone())?)
        }
        BlockExchange::Concatenate { name, parts } => {
            Block::Concatenate(Concatenate::new(*parts, name.clone()))
        }
        BlockExchange::Unpacker { name, indices } => {
            Block::Unpacker(Unpacker::new(indices.clone(), name.clone()))
        }
        BlockExchange::WorkflowBlock { name, workflow } => {
            let workflow = Rc::new(Workflow::from_exchange(workflow, registry)?);
            Block::WorkflowBlock(WorkflowBlock::new(workflow, name.clone()))
        }
        BlockExchange::ForEach {
            name,
            block_name,
            workflow,
            iter_input_index,
        } => {
            let workflow = Rc::new(Workflow::from_exchange(workflow, registry)?);
            let workflow_block = WorkflowBlock::new(workflow, block_name.clone());
            Block::ForEach(ForEach::new(workflow_block, *iter_input_index, name.clone())?)
        }
        BlockExchange::Export {
            name,
            format,
            export_name,
            extension,
            text,
        } => Block::Export(Export::new(
            registry,
            format,
            ExportRequest {
                export_name: export_name.clone(),
                extension: extension.clone(),
                text: *text,
            },
            name.clone(),
        )?),
        BlockExchange::Archive { name, parts } => Block::Archive(Archive::new(*parts, name.clone())),
        BlockExchange::MultiPlot { name, attributes } => {
            Block::MultiPlot(MultiPlot::new(registry, attributes.clone(), name.clone())?)
        }
    })
}

/// Plain-attribute form of a full [`Workflow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExchange {
    pub name: String,
    pub blocks: Vec<BlockExchange>,
    pub free_variables: Vec<VariableExchange>,
    pub pipes: Vec<Pipe>,
    pub output: VariableRef,
}

impl Workflow {
    pub fn to_exchange(&self) -> WorkflowExchange {
        WorkflowExchange {
            name: self.name.clone(),
            blocks: self.blocks().iter().map(block_to_exchange).collect(),
            free_variables: self
                .free_variables()
                .iter()
                .map(variable_to_exchange)
                .collect(),
            pipes: self.pipes().to_vec(),
            output: self.output(),
        }
    }

    /// Rebuilds a workflow from its exchange form, resolving classes,
    /// methods, functions and writers against the given registry.
    pub fn from_exchange(
        exchange: &WorkflowExchange,
        registry: &ModelRegistry,
    ) -> Result<Workflow, GraphError> {
        let mut builder = WorkflowBuilder::new(exchange.name.clone());
        for block in &exchange.blocks {
            builder.add_block(block_from_exchange(block, registry)?);
        }
        for variable in &exchange.free_variables {
            builder.add_variable(variable_from_exchange(variable)?);
        }
        for pipe in &exchange.pipes {
            builder.add_pipe(pipe.source, pipe.target);
        }
        builder.output(exchange.output);
        builder.build()
    }
}

// ---------------------------------------------------------------------------
// Run state snapshots

fn encode_bindings<'a>(
    workflow: &Workflow,
    bound: impl Iterator<Item = (super::VarId, &'a SharedValue)>,
) -> Vec<(VariableRef, serde_json::Value)> {
    let mut bound: Vec<_> = bound.collect();
    bound.sort_by_key(|&(id, _)| id);
    let mut encoder = TreeEncoder::new();
    bound
        .into_iter()
        .map(|(id, value)| (workflow.origin_at(id), encoder.encode(value)))
        .collect()
}

fn decode_bindings(
    workflow: &Workflow,
    bindings: &[(VariableRef, serde_json::Value)],
) -> Result<AHashMap<super::VarId, SharedValue>, ExchangeError> {
    let mut decoder = TreeDecoder::new();
    let mut values = AHashMap::new();
    for (origin, tree) in bindings {
        let id = workflow.id_of(*origin).ok_or_else(|| {
            ExchangeError::Malformed(format!("binding for unknown variable {:?}", origin))
        })?;
        values.insert(id, decoder.decode(tree)?);
    }
    Ok(values)
}

/// Snapshot of an in-progress run: workflow structure, bound values with
/// cross-references intact, activation flags and the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateExchange {
    pub workflow: WorkflowExchange,
    pub bindings: Vec<(VariableRef, serde_json::Value)>,
    pub activated_pipes: Vec<bool>,
    pub activated_blocks: Vec<bool>,
    pub log: RunLog,
    pub progress: f64,
}

impl<'w> WorkflowState<'w> {
    pub fn to_exchange(&self) -> WorkflowStateExchange {
        let (pipes, blocks) = self.activation_flags();
        WorkflowStateExchange {
            workflow: self.workflow().to_exchange(),
            bindings: encode_bindings(self.workflow(), self.bound_variables()),
            activated_pipes: pipes.to_vec(),
            activated_blocks: blocks.to_vec(),
            log: self.log().clone(),
            progress: self.progress(),
        }
    }

    /// Restores a paused run against an already-rebuilt workflow. The
    /// exchange snapshot must describe the same workflow structure.
    pub fn from_exchange(
        workflow: &'w Workflow,
        exchange: &WorkflowStateExchange,
    ) -> Result<WorkflowState<'w>, ExchangeError> {
        if workflow.to_exchange() != exchange.workflow {
            return Err(ExchangeError::Malformed(
                "state snapshot does not match the given workflow".to_string(),
            ));
        }
        if exchange.activated_pipes.len() != workflow.pipes().len()
            || exchange.activated_blocks.len() != workflow.blocks().len()
        {
            return Err(ExchangeError::Malformed(
                "activation flags do not match the workflow shape".to_string(),
            ));
        }
        let values = decode_bindings(workflow, &exchange.bindings)?;
        Ok(WorkflowState::restore(
            workflow,
            values,
            exchange.activated_pipes.clone(),
            exchange.activated_blocks.clone(),
            exchange.log.clone(),
        ))
    }
}

/// Snapshot of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunExchange {
    pub workflow: WorkflowExchange,
    pub bindings: Vec<(VariableRef, serde_json::Value)>,
    pub log: RunLog,
    pub output: VariableRef,
}

impl<'w> WorkflowRun<'w> {
    pub fn to_exchange(&self) -> WorkflowRunExchange {
        WorkflowRunExchange {
            workflow: self.workflow().to_exchange(),
            bindings: encode_bindings(self.workflow(), self.bound_variables()),
            log: self.log().clone(),
            output: self.workflow().output(),
        }
    }

    pub fn from_exchange(
        workflow: &'w Workflow,
        exchange: &WorkflowRunExchange,
    ) -> Result<WorkflowRun<'w>, ExchangeError> {
        if workflow.to_exchange() != exchange.workflow {
            return Err(ExchangeError::Malformed(
                "run snapshot does not match the given workflow".to_string(),
            ));
        }
        let values = decode_bindings(workflow, &exchange.bindings)?;
        let output_id = workflow.id_of(exchange.output).ok_or_else(|| {
            ExchangeError::Malformed("snapshot output is not a variable of this workflow".to_string())
        })?;
        let output_value = values
            .get(&output_id)
            .cloned()
            .ok_or_else(|| ExchangeError::Malformed("snapshot has no output binding".to_string()))?;
        Ok(WorkflowRun::new(
            workflow,
            values,
            exchange.log.clone(),
            output_value,
        ))
    }
}

// ---------------------------------------------------------------------------
// On-disk artifact

/// Compact on-disk form of a workflow definition plus its input schema,
/// written with bincode.
///
/// The workflow itself is embedded as a JSON exchange document; the value
/// trees it may carry (variable defaults) are self-describing and cannot go
/// through a fixed-layout codec directly.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowArtifact {
    workflow_json: String,
    pub input_schema: Vec<InputSchema>,
}

impl WorkflowArtifact {
    pub fn of(workflow: &Workflow) -> Result<Self, ExchangeError> {
        let workflow_json = serde_json::to_string(&workflow.to_exchange())
            .map_err(|e| ExchangeError::Encode(e.to_string()))?;
        Ok(Self {
            workflow_json,
            input_schema: workflow.input_schema(),
        })
    }

    pub fn workflow_exchange(&self) -> Result<WorkflowExchange, ExchangeError> {
        serde_json::from_str(&self.workflow_json)
            .map_err(|e| ExchangeError::Decode(e.to_string()))
    }

    pub fn into_workflow(&self, registry: &ModelRegistry) -> Result<Workflow, GraphError> {
        let exchange = self
            .workflow_exchange()
            .map_err(|e| GraphError::MalformedExchange(e.to_string()))?;
        Workflow::from_exchange(&exchange, registry)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ExchangeError> {
        encode_to_vec(self, standard()).map_err(|e| ExchangeError::Encode(e.to_string()))
    }

    /// Saves the artifact to a file.
    pub fn save(&self, path: &str) -> Result<(), ExchangeError> {
        let bytes = self.to_bytes()?;
        let mut file = fs::File::create(path)
            .map_err(|e| ExchangeError::Io(format!("could not create '{}': {}", path, e)))?;
        file.write_all(&bytes)
            .map_err(|e| ExchangeError::Io(format!("could not write '{}': {}", path, e)))
    }

    /// Loads an artifact from a file.
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let mut file = fs::File::open(path)
            .map_err(|e| ExchangeError::Io(format!("could not open '{}': {}", path, e)))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ExchangeError::Io(format!("could not read '{}': {}", path, e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExchangeError> {
        decode_from_slice(bytes, standard())
            .map(|(artifact, _)| artifact)
            .map_err(|e| ExchangeError::Decode(e.to_string()))
    }
}
