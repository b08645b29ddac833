//! The narrow reflection boundary of the engine.
//!
//! Rather than inspecting arbitrary user callables at run time, all model
//! classes, methods and free functions are registered up front with an
//! explicit, immutable [`Signature`]. Blocks resolve their input lists from
//! these signatures once, at construction; nothing is reflected during a run.

use crate::block::EvalContext;
use crate::error::EvalError;
use crate::value::{SharedValue, Typing, Value};
use ahash::AHashMap;
use std::rc::Rc;

mod registry;

pub use registry::ModelRegistry;

/// A dynamically-typed user object: a class name plus named fields.
///
/// Fields hold [`SharedValue`] handles, so an instance stored in several
/// places is one object, not several copies: a method mutating a field is
/// observed by every holder.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInstance {
    pub class: String,
    fields: AHashMap<String, SharedValue>,
}

impl ModelInstance {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: AHashMap::new(),
        }
    }

    /// Builder-style field initialization.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), crate::value::shared(value));
        self
    }

    /// Returns the field's shared handle, or `None` if absent.
    pub fn get(&self, name: &str) -> Option<SharedValue> {
        self.fields.get(name).cloned()
    }

    /// Binds a field to an existing shared handle, aliasing it.
    pub fn set(&mut self, name: impl Into<String>, value: SharedValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// One declared parameter of a constructor, method or function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub typing: Typing,
    pub default: Option<Value>,
}

/// Ordered parameter list of a registered callable. Signatures are immutable
/// once registered, which is why the registry needs no invalidation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, typing: Typing) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            typing,
            default: None,
        });
        self
    }

    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        typing: Typing,
        default: Value,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            typing,
            default: Some(default),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Constructor callable: receives one value per declared parameter, in order.
pub type ConstructorFn = Rc<dyn Fn(&[SharedValue]) -> Result<Value, EvalError>>;

/// Method callable: receiver handle first, then parameters in order. The
/// [`EvalContext`] lets long-running methods report fractional sub-progress.
pub type MethodFn = Rc<dyn Fn(&SharedValue, &[SharedValue], &mut EvalContext) -> Result<Value, EvalError>>;

/// Free-function callable.
pub type FunctionFn = Rc<dyn Fn(&[SharedValue]) -> Result<Value, EvalError>>;

/// A registered model class: constructor signature and callable, plus its
/// method table.
pub struct ModelClass {
    pub name: String,
    pub constructor: Signature,
    pub(crate) instantiate: ConstructorFn,
    pub(crate) methods: AHashMap<String, Rc<MethodSpec>>,
}

impl ModelClass {
    pub fn new(
        name: impl Into<String>,
        constructor: Signature,
        instantiate: impl Fn(&[SharedValue]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            constructor,
            instantiate: Rc::new(instantiate),
            methods: AHashMap::new(),
        }
    }

    pub fn with_method(mut self, method: MethodSpec) -> Self {
        self.methods.insert(method.name.clone(), Rc::new(method));
        self
    }

    pub fn method(&self, name: &str) -> Option<Rc<MethodSpec>> {
        self.methods.get(name).cloned()
    }

    pub(crate) fn construct(&self, values: &[SharedValue]) -> Result<Value, EvalError> {
        (self.instantiate)(values)
    }
}

impl std::fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("constructor", &self.constructor)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registered method: signature (receiver excluded) and callable.
pub struct MethodSpec {
    pub name: String,
    pub signature: Signature,
    pub(crate) call: MethodFn,
}

impl MethodSpec {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        call: impl Fn(&SharedValue, &[SharedValue], &mut EvalContext) -> Result<Value, EvalError>
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            call: Rc::new(call),
        }
    }

    pub(crate) fn invoke(
        &self,
        receiver: &SharedValue,
        args: &[SharedValue],
        ctx: &mut EvalContext,
    ) -> Result<Value, EvalError> {
        (self.call)(receiver, args, ctx)
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// A registered free function.
pub struct FunctionSpec {
    pub name: String,
    pub signature: Signature,
    pub(crate) call: FunctionFn,
}

impl FunctionSpec {
    pub fn new(
        name: impl Into<String>,
        signature: Signature,
        call: impl Fn(&[SharedValue]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            call: Rc::new(call),
        }
    }

    pub(crate) fn invoke(&self, values: &[SharedValue]) -> Result<Value, EvalError> {
        (self.call)(values)
    }
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}
