//! Boundary traits for export writers and plot renderers.
//!
//! Sink-style blocks (`Export`, `Archive`, `MultiPlot`) delegate their
//! payload to components registered behind these traits and pass an opaque
//! [`ExportArtifact`] marker downstream. The engine never interprets what a
//! writer or renderer actually produced.

use crate::error::EvalError;
use crate::value::{SharedValue, Value};
use crate::workflow::exchange::value_to_tree;
use serde::{Deserialize, Serialize};

/// Opaque marker emitted by sink blocks. Downstream blocks (e.g. `Archive`)
/// only ever inspect the marker, never the written payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub export_name: String,
    pub extension: String,
    pub text: bool,
}

/// Configuration an `Export` block forwards to its writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub export_name: String,
    pub extension: String,
    pub text: bool,
}

/// External component that materializes a value into some export format.
///
/// Implementations are registered on the
/// [`ModelRegistry`](crate::model::ModelRegistry) under a format name and
/// looked up when an `Export` block is constructed.
pub trait ExportWriter {
    fn write(&self, value: &SharedValue, request: &ExportRequest)
    -> Result<ExportArtifact, EvalError>;
}

/// External component that renders a sampled attribute matrix.
///
/// `MultiPlot` hands over one row per object and one column per configured
/// attribute path; whatever the renderer returns is passed through as the
/// block's output without interpretation.
pub trait PlotRenderer {
    fn render(&self, attributes: &[String], rows: Vec<Vec<Value>>) -> Result<Value, EvalError>;
}

/// Default writer registered under the `json` format: encodes the value as an
/// exchange tree to prove it is serializable, then hands back the marker.
#[derive(Debug, Default)]
pub struct JsonWriter;

impl ExportWriter for JsonWriter {
    fn write(
        &self,
        value: &SharedValue,
        request: &ExportRequest,
    ) -> Result<ExportArtifact, EvalError> {
        let tree = value_to_tree(value);
        serde_json::to_string(&tree).map_err(|e| EvalError::User(e.to_string()))?;
        Ok(ExportArtifact {
            export_name: request.export_name.clone(),
            extension: request.extension.clone(),
            text: request.text,
        })
    }
}

/// Default renderer registered under `multiplot`: discards the matrix and
/// yields a marker artifact, which keeps display blocks runnable without a
/// real plotting backend attached.
#[derive(Debug, Default)]
pub struct PassthroughRenderer;

impl PlotRenderer for PassthroughRenderer {
    fn render(&self, _attributes: &[String], _rows: Vec<Vec<Value>>) -> Result<Value, EvalError> {
        Ok(Value::Artifact(ExportArtifact {
            export_name: "multiplot".to_string(),
            extension: "plot".to_string(),
            text: false,
        }))
    }
}
