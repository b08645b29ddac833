//! Sink-style blocks. Their bodies delegate to the export/display boundary
//! (see [`crate::exports`]) and only pass an opaque marker downstream.

use super::{EvalContext, Variable};
use crate::error::{EvalError, GraphError};
use crate::exports::{ExportArtifact, ExportRequest, ExportWriter, PlotRenderer};
use crate::value::{SharedValue, Typing, Value, resolve_attribute_path, shared};
use std::rc::Rc;

/// Hands its input to the writer registered under `format` and emits the
/// resulting artifact marker.
pub struct Export {
    pub name: String,
    pub format: String,
    pub request: ExportRequest,
    writer: Rc<dyn ExportWriter>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl Export {
    pub fn new(
        registry: &crate::model::ModelRegistry,
        format: &str,
        request: ExportRequest,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let writer = registry.writer(format)?;
        Ok(Self {
            name: name.into(),
            format: format.to_string(),
            request,
            writer,
            inputs: vec![Variable::new("model to export")],
            outputs: vec![Variable::new("export artifact")],
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let artifact = self.writer.write(&values[0], &self.request)?;
        Ok(vec![shared(Value::Artifact(artifact))])
    }
}

impl PartialEq for Export {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.format == other.format
            && self.request == other.request
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl std::fmt::Debug for Export {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Export")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("request", &self.request)
            .finish()
    }
}

/// Bundles a fixed number of upstream export artifacts into one `zip`
/// marker. The actual archive encoding belongs to the external writer side;
/// the engine only checks that every input really is an artifact.
#[derive(Debug, PartialEq)]
pub struct Archive {
    pub name: String,
    pub parts: usize,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl Archive {
    pub fn new(parts: usize, name: impl Into<String>) -> Self {
        let inputs = (0..parts)
            .map(|i| Variable::new(format!("export {}", i)))
            .collect();
        Self {
            name: name.into(),
            parts,
            inputs,
            outputs: vec![Variable::new("zip archive")],
        }
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        for value in values {
            let value = value.borrow();
            if !matches!(&*value, Value::Artifact(_)) {
                return Err(EvalError::TypeMismatch {
                    operation: "Archive".to_string(),
                    expected: "Artifact".to_string(),
                    found: value.kind().to_string(),
                });
            }
        }
        Ok(vec![shared(Value::Artifact(ExportArtifact {
            export_name: self.name.clone(),
            extension: "zip".to_string(),
            text: false,
        }))])
    }
}

/// Samples the configured attribute paths off every object of an input
/// sequence and hands the resulting matrix to the registered renderer.
pub struct MultiPlot {
    pub name: String,
    pub attributes: Vec<String>,
    renderer: Rc<dyn PlotRenderer>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl MultiPlot {
    pub fn new(
        registry: &crate::model::ModelRegistry,
        attributes: Vec<String>,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let renderer = registry.renderer("multiplot")?;
        Ok(Self {
            name: name.into(),
            attributes,
            renderer,
            inputs: vec![Variable::typed("objects", Typing::Sequence)],
            outputs: vec![Variable::new("display")],
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let items = super::expect_sequence(&values[0], "MultiPlot")?;
        let mut rows = Vec::with_capacity(items.len());
        for item in &items {
            let mut row = Vec::with_capacity(self.attributes.len());
            for attribute in &self.attributes {
                let cell = resolve_attribute_path(item, attribute)?;
                let cell = cell.borrow().clone();
                row.push(cell);
            }
            rows.push(row);
        }
        let marker = self.renderer.render(&self.attributes, rows)?;
        Ok(vec![shared(marker)])
    }
}

impl PartialEq for MultiPlot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl std::fmt::Debug for MultiPlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPlot")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .finish()
    }
}
