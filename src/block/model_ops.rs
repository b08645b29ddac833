//! Blocks that call into registered user code: constructors, methods,
//! attribute reads and free functions.

use super::{EvalContext, Variable};
use crate::error::{EvalError, GraphError};
use crate::model::{MethodSpec, ModelClass, ModelRegistry, ParamSpec};
use crate::value::{SharedValue, Typing, resolve_attribute_path, shared};
use std::rc::Rc;

fn param_variable(param: &ParamSpec) -> Variable {
    Variable {
        name: param.name.clone(),
        typing: param.typing.clone(),
        default: param.default.clone(),
    }
}

/// Instantiates a registered model class. Inputs mirror the constructor's
/// declared parameters in order; the single output is the new object.
pub struct InstantiateModel {
    pub name: String,
    pub class: String,
    class_ref: Rc<ModelClass>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl InstantiateModel {
    pub fn new(
        registry: &ModelRegistry,
        class: &str,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let class_ref = registry.class(class)?;
        let inputs = class_ref.constructor.params.iter().map(param_variable).collect();
        let outputs = vec![Variable::typed(
            "instantiated object",
            Typing::Class(class.to_string()),
        )];
        Ok(Self {
            name: name.into(),
            class: class.to_string(),
            class_ref,
            inputs,
            outputs,
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let object = self.class_ref.construct(values)?;
        Ok(vec![shared(object)])
    }
}

impl PartialEq for InstantiateModel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.class == other.class
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl std::fmt::Debug for InstantiateModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantiateModel")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

/// Calls a registered method. Input 0 is the receiver, the remaining inputs
/// are the method's parameters in order. The receiver handle is re-emitted as
/// the second output so in-place mutation is visible downstream without an
/// extra pipe.
pub struct ModelMethod {
    pub name: String,
    pub class: String,
    pub method: String,
    method_ref: Rc<MethodSpec>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl ModelMethod {
    pub fn new(
        registry: &ModelRegistry,
        class: &str,
        method: &str,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let method_ref = registry.method(class, method)?;
        let mut inputs = vec![Variable::typed(
            "model at input",
            Typing::Class(class.to_string()),
        )];
        inputs.extend(method_ref.signature.params.iter().map(param_variable));
        let outputs = vec![
            Variable::new(format!("method result of {}", method)),
            Variable::typed(
                format!("model at output {}", method),
                Typing::Class(class.to_string()),
            ),
        ];
        Ok(Self {
            name: name.into(),
            class: class.to_string(),
            method: method.to_string(),
            method_ref,
            inputs,
            outputs,
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let result = self.method_ref.invoke(&values[0], &values[1..], ctx)?;
        Ok(vec![shared(result), values[0].clone()])
    }
}

impl PartialEq for ModelMethod {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.class == other.class
            && self.method == other.method
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl std::fmt::Debug for ModelMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMethod")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("method", &self.method)
            .finish()
    }
}

/// Reads an attribute off an object. The attribute may be a `/`-separated
/// path walking nested objects and sequence indices. The output shares the
/// field's handle; it is never a copy.
#[derive(Debug, PartialEq)]
pub struct ModelAttribute {
    pub name: String,
    pub attribute: String,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl ModelAttribute {
    pub fn new(attribute: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into(),
            inputs: vec![Variable::new("model")],
            outputs: vec![Variable::new("model attribute")],
        }
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let value = resolve_attribute_path(&values[0], &self.attribute)?;
        Ok(vec![value])
    }
}

/// Calls a registered free function; inputs are its parameters in order, the
/// single output is the return value.
pub struct FunctionCall {
    pub name: String,
    pub function: String,
    function_ref: Rc<crate::model::FunctionSpec>,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) outputs: Vec<Variable>,
}

impl FunctionCall {
    pub fn new(
        registry: &ModelRegistry,
        function: &str,
        name: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let function_ref = registry.function(function)?;
        let inputs = function_ref.signature.params.iter().map(param_variable).collect();
        let outputs = vec![Variable::new("function result")];
        Ok(Self {
            name: name.into(),
            function: function.to_string(),
            function_ref,
            inputs,
            outputs,
        })
    }

    pub(crate) fn evaluate(
        &self,
        values: &[SharedValue],
        _ctx: &mut EvalContext,
    ) -> Result<Vec<SharedValue>, EvalError> {
        let result = self.function_ref.invoke(values)?;
        Ok(vec![shared(result)])
    }
}

impl PartialEq for FunctionCall {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.function == other.function
            && self.inputs == other.inputs
            && self.outputs == other.outputs
    }
}

impl std::fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionCall")
            .field("name", &self.name)
            .field("function", &self.function)
            .finish()
    }
}
