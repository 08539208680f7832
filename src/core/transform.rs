//! Data transformations: replacing a task argument by a derived value before
//! the task body runs.

use crate::core::ArgValue;
use crate::core::arguments::ArgSlot;
use crate::core::call::{Call, DataDependency};
use crate::core::error::{TaskError, TransformationError};
use crate::core::function::FunctionSignature;
use crate::core::scheduler::AsyncUnit;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub const IS_WORKFLOW: &str = "is_workflow";

/// A value transformation. Implemented for every matching closure.
pub trait Transform: Send + Sync {
    fn apply(
        &self,
        value: ArgValue,
        kwargs: &HashMap<String, ArgValue>,
    ) -> Result<ArgValue, TaskError>;
}

impl<F> Transform for F
where
    F: Fn(ArgValue, &HashMap<String, ArgValue>) -> Result<ArgValue, TaskError> + Send + Sync,
{
    fn apply(
        &self,
        value: ArgValue,
        kwargs: &HashMap<String, ArgValue>,
    ) -> Result<ArgValue, TaskError> {
        self(value, kwargs)
    }
}

/// Either a transform given directly, or the name of one registered on the
/// runtime.
#[derive(Clone)]
pub enum TransformFn {
    Inline(Arc<dyn Transform>),
    Named(String),
}

impl TransformFn {
    pub fn inline<F>(f: F) -> Self
    where
        F: Fn(ArgValue, &HashMap<String, ArgValue>) -> Result<ArgValue, TaskError>
            + Send
            + Sync
            + 'static,
    {
        TransformFn::Inline(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        TransformFn::Named(name.into())
    }

    fn resolve(
        &self,
        registry: &TransformRegistry,
    ) -> Result<Arc<dyn Transform>, TransformationError> {
        match self {
            TransformFn::Inline(f) => Ok(f.clone()),
            TransformFn::Named(name) => registry
                .get(name)
                .ok_or_else(|| TransformationError::NotCallable(name.clone())),
        }
    }

    fn label(&self) -> &str {
        match self {
            TransformFn::Inline(_) => "<inline>",
            TransformFn::Named(name) => name,
        }
    }
}

impl fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformFn::Inline(_) => f.write_str("Inline(..)"),
            TransformFn::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// Named transforms available to [`TransformFn::Named`].
#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Arc<dyn Transform>>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(ArgValue, &HashMap<String, ArgValue>) -> Result<ArgValue, TaskError>
            + Send
            + Sync
            + 'static,
    {
        self.register_transform(name, Arc::new(f));
    }

    pub fn register_transform(&self, name: impl Into<String>, transform: Arc<dyn Transform>) {
        let name = name.into();
        let mut transforms = self.transforms.write().expect("transform registry poisoned");
        if transforms.insert(name.clone(), transform).is_some() {
            log::warn!("Transform `{}` was already registered, replacing it.", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms
            .read()
            .expect("transform registry poisoned")
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms
            .read()
            .expect("transform registry poisoned")
            .contains_key(name)
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transforms = self.transforms.read().expect("transform registry poisoned");
        let mut names: Vec<&String> = transforms.keys().collect();
        names.sort();
        f.debug_struct("TransformRegistry").field("names", &names).finish()
    }
}

/// One parameter substitution.
#[derive(Debug, Clone)]
pub struct TransformationSpec {
    parameter: String,
    transform: TransformFn,
    kwargs: HashMap<String, ArgValue>,
    workflow: bool,
}

impl TransformationSpec {
    pub fn new(parameter: impl Into<String>, transform: TransformFn) -> Self {
        Self {
            parameter: parameter.into(),
            transform,
            kwargs: HashMap::new(),
            workflow: false,
        }
    }

    /// Keyword arguments forwarded to the transform. An `is_workflow` entry
    /// is taken out and selects the execution mode.
    pub fn with_kwargs(mut self, mut kwargs: HashMap<String, ArgValue>) -> Self {
        if let Some(flag) = kwargs.remove(IS_WORKFLOW) {
            self.workflow = is_truthy(&flag);
        }
        self.kwargs = kwargs;
        self
    }

    /// Run inline (`true`) or as an asynchronous unit (`false`, the default).
    pub fn workflow(mut self, workflow: bool) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn transform(&self) -> &TransformFn {
        &self.transform
    }

    pub fn kwargs(&self) -> &HashMap<String, ArgValue> {
        &self.kwargs
    }

    pub fn is_workflow(&self) -> bool {
        self.workflow
    }
}

/// `True`, `"True"`, `"true"`, `1` and `"1"` count as set.
pub fn is_truthy(value: &ArgValue) -> bool {
    match value {
        ArgValue::Bool(b) => *b,
        ArgValue::Number(n) => n.as_i64() == Some(1),
        ArgValue::String(s) => matches!(s.as_str(), "True" | "true" | "1"),
        _ => false,
    }
}

/// Where a parameter's current value lives and what it is.
fn locate(
    call: &Call,
    signature: &FunctionSignature,
    parameter: &str,
) -> Result<(ArgSlot, ArgValue), TransformationError> {
    let arguments = call.arguments();
    if let Some(value) = arguments.keyword(parameter) {
        return Ok((ArgSlot::Keyword(parameter.to_string()), value.clone()));
    }
    let position = signature.position(parameter).ok_or_else(|| {
        TransformationError::UnknownParameter {
            function: signature.qualified_name(),
            parameter: parameter.to_string(),
        }
    })?;
    match arguments.get_positional(position) {
        Some(value) => Ok((ArgSlot::Positional(position), value.clone())),
        None => Ok((
            ArgSlot::Keyword(parameter.to_string()),
            signature.default_of(parameter).cloned().unwrap_or(ArgValue::Null),
        )),
    }
}

/// Applies `specs` to the call's arguments.
///
/// Every spec is validated before anything runs, so a bad spec never leaves
/// an asynchronous unit behind. Workflow-mode specs substitute their result
/// immediately; task-mode specs submit a unit, blank the slot and record a
/// dependency that is resolved before the body starts.
pub fn apply_transformations(
    call: &mut Call,
    signature: &FunctionSignature,
    specs: &[TransformationSpec],
) -> Result<(), TaskError> {
    let registry = call.runtime().transforms();
    let mut planned = Vec::with_capacity(specs.len());
    for spec in specs {
        let (slot, value) = locate(call, signature, spec.parameter())?;
        let transform = spec.transform().resolve(registry)?;
        planned.push((spec, slot, value, transform));
    }
    for (spec, ..) in &planned {
        call.claim_transformation_target(spec.parameter())?;
    }

    for (spec, slot, value, transform) in planned {
        if spec.is_workflow() {
            log::debug!(
                "Applying transform {} to `{}` inline.",
                spec.transform().label(),
                spec.parameter()
            );
            let result = transform.apply(value, spec.kwargs())?;
            call.arguments_mut().set(&slot, result);
        } else {
            let unit = AsyncUnit::new(
                format!("transform[{}]", spec.parameter()),
                transform,
                value,
                spec.kwargs().clone(),
            );
            log::debug!(
                "Submitting transform {} of `{}` as unit {}.",
                spec.transform().label(),
                spec.parameter(),
                unit.id()
            );
            let handle = call.runtime().scheduler().submit(unit);
            call.arguments_mut().set(&slot, ArgValue::Null);
            call.add_dependency(DataDependency {
                parameter: spec.parameter().to_string(),
                slot,
                unit: handle,
            });
        }
    }
    Ok(())
}
