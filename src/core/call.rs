//! Per-call state shared by every annotation layer of one invocation.

use crate::core::ArgValue;
use crate::core::arguments::{ArgSlot, Arguments};
use crate::core::context::ExecutionContext;
use crate::core::element::CoreElementBuilder;
use crate::core::error::TransformationError;
use crate::core::runtime::Runtime;
use crate::core::scheduler::UnitHandle;
use crate::core::transform::TransformationSpec;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A producer-to-consumer edge: `slot` receives the result of `unit` before
/// the body starts.
#[derive(Debug)]
pub struct DataDependency {
    pub parameter: String,
    pub slot: ArgSlot,
    pub unit: UnitHandle,
}

/// The view one annotation layer opens over the call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    overrides: HashMap<String, ArgValue>,
    prepend_strings: bool,
}

impl Default for CallFrame {
    fn default() -> Self {
        Self::new(HashMap::new(), true)
    }
}

impl CallFrame {
    pub fn new(overrides: HashMap<String, ArgValue>, prepend_strings: bool) -> Self {
        Self {
            overrides,
            prepend_strings,
        }
    }

    pub fn overrides(&self) -> &HashMap<String, ArgValue> {
        &self.overrides
    }

    pub fn prepend_strings(&self) -> bool {
        self.prepend_strings
    }
}

/// Serializes the first configuration of one annotation stack. Every layer
/// of a stack shares the same gate.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationGate(Arc<Mutex<()>>);

impl ConfigurationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_as(&self, other: &ConfigurationGate) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One invocation travelling through an annotation stack.
pub struct Call {
    runtime: Runtime,
    context: ExecutionContext,
    arguments: Arguments,
    core_element: Option<CoreElementBuilder>,
    frames: Vec<CallFrame>,
    dependencies: Vec<DataDependency>,
    transformations: Option<Vec<TransformationSpec>>,
    call_transformations_taken: bool,
    transformed: HashSet<String>,
    pending_configuration: Vec<Arc<AtomicBool>>,
    configuration_guard: Option<OwnedMutexGuard<()>>,
}

impl Call {
    /// A call under the runtime's current execution context.
    pub fn new(runtime: &Runtime, arguments: Arguments) -> Self {
        Self::with_context(runtime, runtime.context(), arguments)
    }

    pub fn with_context(
        runtime: &Runtime,
        context: ExecutionContext,
        arguments: Arguments,
    ) -> Self {
        Self {
            runtime: runtime.clone(),
            context,
            arguments,
            core_element: None,
            frames: Vec::new(),
            dependencies: Vec::new(),
            transformations: None,
            call_transformations_taken: false,
            transformed: HashSet::new(),
            pending_configuration: Vec::new(),
            configuration_guard: None,
        }
    }

    /// Seeds the call with a frame opened elsewhere, e.g. the layers that ran
    /// before the call was handed to a scheduler.
    pub fn with_frame(mut self, frame: CallFrame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Data transformations supplied with this call. They replace the ones
    /// declared on `@data_transformation` annotations.
    pub fn with_transformations(mut self, specs: Vec<TransformationSpec>) -> Self {
        self.transformations = Some(specs);
        self
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn arguments_mut(&mut self) -> &mut Arguments {
        &mut self.arguments
    }

    pub fn into_arguments(self) -> Arguments {
        self.arguments
    }

    /// The descriptor under construction, created on first access.
    pub fn core_element(&mut self) -> &mut CoreElementBuilder {
        self.core_element.get_or_insert_with(|| {
            log::debug!("Creating a new core element for this call.");
            CoreElementBuilder::new()
        })
    }

    pub fn peek_core_element(&self) -> Option<&CoreElementBuilder> {
        self.core_element.as_ref()
    }

    pub fn take_core_element(&mut self) -> Option<CoreElementBuilder> {
        self.core_element.take()
    }

    /// Opens a frame for one annotation layer. The frame is popped when the
    /// returned guard is dropped.
    pub fn enter_frame(&mut self, prepend_strings: bool) -> ScopedCall<'_> {
        let overrides = match self.arguments.receiver() {
            Some(receiver) => self
                .arguments
                .keyword_values()
                .iter()
                .filter(|(name, _)| receiver.contains_key(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            None => HashMap::new(),
        };
        self.frames.push(CallFrame {
            overrides,
            prepend_strings,
        });
        ScopedCall { call: self }
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// The receiver attribute as seen from the innermost open frame.
    pub fn receiver_attribute(&self, name: &str) -> Option<&ArgValue> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.overrides.get(name))
            .or_else(|| self.arguments.receiver().and_then(|r| r.get(name)))
    }

    /// Whether string arguments get a marshalling prefix. Any open frame can
    /// switch it off.
    pub fn prepend_strings(&self) -> bool {
        self.frames.iter().all(|frame| frame.prepend_strings)
    }

    /// All open frames collapsed into one, inner overrides winning.
    pub fn effective_frame(&self) -> CallFrame {
        let overrides = self
            .frames
            .iter()
            .flat_map(|frame| frame.overrides.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        CallFrame::new(overrides, self.prepend_strings())
    }

    pub fn add_dependency(&mut self, dependency: DataDependency) {
        self.dependencies.push(dependency);
    }

    pub fn dependencies(&self) -> &[DataDependency] {
        &self.dependencies
    }

    pub fn take_dependencies(&mut self) -> Vec<DataDependency> {
        std::mem::take(&mut self.dependencies)
    }

    pub fn transformations(&self) -> Option<&[TransformationSpec]> {
        self.transformations.as_deref()
    }

    /// Hands the call-time transformations to the first layer that asks.
    pub fn take_transformations(&mut self) -> Option<Vec<TransformationSpec>> {
        let taken = self.transformations.take();
        if taken.is_some() {
            self.call_transformations_taken = true;
        }
        taken
    }

    /// True when the call carries its own transformations, taken or not.
    /// Declared ones are skipped in that case.
    pub fn has_call_transformations(&self) -> bool {
        self.call_transformations_taken || self.transformations.is_some()
    }

    /// Reserves `parameter` as a transformation target for this call.
    pub fn claim_transformation_target(
        &mut self,
        parameter: &str,
    ) -> Result<(), TransformationError> {
        if self.transformed.insert(parameter.to_string()) {
            Ok(())
        } else {
            Err(TransformationError::DuplicateTarget(parameter.to_string()))
        }
    }

    pub fn is_transformed(&self, parameter: &str) -> bool {
        self.transformed.contains(parameter)
    }

    /// Waits for `gate` and holds it until the configuration is committed or
    /// the call is dropped. A no-op when this call already holds it.
    pub async fn hold_configuration(&mut self, gate: &ConfigurationGate) {
        if self.configuration_guard.is_none() {
            self.configuration_guard = Some(gate.0.clone().lock_owned().await);
        }
    }

    pub fn holds_configuration(&self) -> bool {
        self.configuration_guard.is_some()
    }

    /// Records a decorator's `configured` flag, set once the whole stack has
    /// configured without error.
    pub fn defer_configuration(&mut self, flag: Arc<AtomicBool>) {
        self.pending_configuration.push(flag);
    }

    pub fn commit_configuration(&mut self) {
        for flag in self.pending_configuration.drain(..) {
            flag.store(true, Ordering::Release);
        }
        self.configuration_guard = None;
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("context", &self.context)
            .field("arguments", &self.arguments)
            .field("core_element", &self.core_element)
            .field("frames", &self.frames.len())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

/// A [`Call`] with one more frame open.
pub struct ScopedCall<'a> {
    call: &'a mut Call,
}

impl Deref for ScopedCall<'_> {
    type Target = Call;

    fn deref(&self) -> &Call {
        self.call
    }
}

impl DerefMut for ScopedCall<'_> {
    fn deref_mut(&mut self) -> &mut Call {
        self.call
    }
}

impl Drop for ScopedCall<'_> {
    fn drop(&mut self) {
        self.call.frames.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_with(arguments: Arguments) -> Call {
        Call::with_context(&Runtime::local(), ExecutionContext::master(), arguments)
    }

    #[test]
    fn test_one_builder_per_call() {
        let mut call = call_with(Arguments::new());
        assert!(call.peek_core_element().is_none());
        let first = call.core_element().id();
        let second = call.core_element().id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_frames_override_receiver_and_restore() {
        let args = Arguments::positional([json!({"size": 1, "name": "grid"})])
            .kwarg("size", 8)
            .kwarg("unrelated", true);
        let mut call = call_with(args);
        assert_eq!(call.receiver_attribute("size"), Some(&json!(1)));
        {
            let scoped = call.enter_frame(false);
            assert_eq!(scoped.receiver_attribute("size"), Some(&json!(8)));
            assert_eq!(scoped.receiver_attribute("name"), Some(&json!("grid")));
            assert!(scoped.frames()[0].overrides().get("unrelated").is_none());
            assert!(!scoped.prepend_strings());
        }
        assert!(call.frames().is_empty());
        assert_eq!(call.receiver_attribute("size"), Some(&json!(1)));
        assert!(call.prepend_strings());
    }

    #[test]
    fn test_duplicate_transformation_target() {
        let mut call = call_with(Arguments::new());
        call.claim_transformation_target("x").unwrap();
        assert_eq!(
            call.claim_transformation_target("x"),
            Err(TransformationError::DuplicateTarget("x".to_string()))
        );
    }

    #[test]
    fn test_configuration_committed_together() {
        let mut call = call_with(Arguments::new());
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        call.defer_configuration(a.clone());
        call.defer_configuration(b.clone());
        assert!(!a.load(Ordering::Acquire));
        call.commit_configuration();
        assert!(a.load(Ordering::Acquire) && b.load(Ordering::Acquire));
    }

    #[test]
    fn test_effective_frame_merges_inner_over_outer() {
        let args = Arguments::positional([json!({"size": 1, "depth": 2})])
            .kwarg("size", 8)
            .kwarg("depth", 3);
        let mut call = call_with(args);
        let mut outer = call.enter_frame(true);
        outer.arguments_mut().set(&ArgSlot::Keyword("size".into()), json!(16));
        let inner = outer.enter_frame(false);
        let frame = inner.effective_frame();
        assert_eq!(frame.overrides().get("size"), Some(&json!(16)));
        assert_eq!(frame.overrides().get("depth"), Some(&json!(3)));
        assert!(!frame.prepend_strings());

        let seeded = call_with(Arguments::new()).with_frame(frame.clone());
        assert_eq!(seeded.receiver_attribute("size"), Some(&json!(16)));
        assert!(!seeded.prepend_strings());
    }

    #[tokio::test]
    async fn test_configuration_gate_released_on_commit() {
        let gate = ConfigurationGate::new();
        let mut first = call_with(Arguments::new());
        first.hold_configuration(&gate).await;
        first.hold_configuration(&gate).await;
        assert!(first.holds_configuration());
        assert!(gate.0.try_lock().is_err());

        first.commit_configuration();
        assert!(!first.holds_configuration());
        let mut second = call_with(Arguments::new());
        second.hold_configuration(&gate).await;
        drop(second);
        assert!(gate.0.try_lock().is_ok());
    }
}
