use super::{FunctionSpec, MethodSpec, ModelClass};
use crate::error::GraphError;
use crate::exports::{ExportWriter, JsonWriter, PassthroughRenderer, PlotRenderer};
use ahash::AHashMap;
use itertools::Itertools;
use std::rc::Rc;

/// Registry of everything the engine may call into on the user's behalf:
/// model classes with their constructors and methods, free functions, export
/// writers and plot renderers.
///
/// The registry is the injectable signature cache: it is consulted once, when
/// a block is constructed, and never during a run. Signatures are immutable,
/// so there is no invalidation story.
pub struct ModelRegistry {
    classes: AHashMap<String, Rc<ModelClass>>,
    functions: AHashMap<String, Rc<FunctionSpec>>,
    writers: AHashMap<String, Rc<dyn ExportWriter>>,
    renderers: AHashMap<String, Rc<dyn PlotRenderer>>,
}

impl ModelRegistry {
    /// Creates a registry preloaded with the built-in `json` writer and the
    /// pass-through `multiplot` renderer.
    pub fn new() -> Self {
        let mut writers: AHashMap<String, Rc<dyn ExportWriter>> = AHashMap::new();
        writers.insert("json".to_string(), Rc::new(JsonWriter));
        let mut renderers: AHashMap<String, Rc<dyn PlotRenderer>> = AHashMap::new();
        renderers.insert("multiplot".to_string(), Rc::new(PassthroughRenderer));
        Self {
            classes: AHashMap::new(),
            functions: AHashMap::new(),
            writers,
            renderers,
        }
    }

    pub fn with_class(mut self, class: ModelClass) -> Self {
        self.classes.insert(class.name.clone(), Rc::new(class));
        self
    }

    pub fn with_function(mut self, function: FunctionSpec) -> Self {
        self.functions.insert(function.name.clone(), Rc::new(function));
        self
    }

    pub fn with_writer(mut self, format: impl Into<String>, writer: Rc<dyn ExportWriter>) -> Self {
        self.writers.insert(format.into(), writer);
        self
    }

    pub fn with_renderer(mut self, name: impl Into<String>, renderer: Rc<dyn PlotRenderer>) -> Self {
        self.renderers.insert(name.into(), renderer);
        self
    }

    pub fn class(&self, name: &str) -> Result<Rc<ModelClass>, GraphError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownClass {
                class: name.to_string(),
            })
    }

    pub fn method(&self, class: &str, method: &str) -> Result<Rc<MethodSpec>, GraphError> {
        self.class(class)?
            .method(method)
            .ok_or_else(|| GraphError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            })
    }

    pub fn function(&self, name: &str) -> Result<Rc<FunctionSpec>, GraphError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownFunction {
                function: name.to_string(),
            })
    }

    pub fn writer(&self, format: &str) -> Result<Rc<dyn ExportWriter>, GraphError> {
        self.writers
            .get(format)
            .cloned()
            .ok_or_else(|| GraphError::UnknownWriter {
                format: format.to_string(),
            })
    }

    pub fn renderer(&self, name: &str) -> Result<Rc<dyn PlotRenderer>, GraphError> {
        self.renderers
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownRenderer {
                name: name.to_string(),
            })
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("classes", &self.classes.keys().sorted().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().sorted().collect::<Vec<_>>())
            .field("writers", &self.writers.keys().sorted().collect::<Vec<_>>())
            .field("renderers", &self.renderers.keys().sorted().collect::<Vec<_>>())
            .finish()
    }
}
