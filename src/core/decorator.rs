//! The uniform lifecycle every annotation shares: scope gating, at-most-once
//! configuration of the task descriptor, per-call preparation and a call
//! frame around the inner layer.

use crate::core::ArgValue;
use crate::core::arguments::DecoratorArguments;
use crate::core::call::{Call, ConfigurationGate};
use crate::core::context::ExecutionContext;
use crate::core::element::CoreElementBuilder;
use crate::core::error::TaskError;
use crate::core::function::{FunctionSignature, TaskFunction};
use crate::core::runtime::Runtime;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One annotation type. Construction validates and normalizes the
/// decoration-time arguments; the methods below run at call time.
#[async_trait]
pub trait Annotation: Send + Sync + 'static {
    /// `@name`, used in logs and errors.
    fn name(&self) -> &'static str;

    /// The normalized decoration-time arguments.
    fn arguments(&self) -> &DecoratorArguments;

    /// Writes this annotation's fields into the call's descriptor. Runs at
    /// most once per decorated function.
    fn configure(
        &self,
        element: &mut CoreElementBuilder,
        function: &FunctionSignature,
    ) -> Result<(), TaskError>;

    /// Runs on every admitted call, before the frame is opened.
    fn prepare(&self, _call: &mut Call, _function: &FunctionSignature) -> Result<(), TaskError> {
        Ok(())
    }

    /// Whether string arguments keep their marshalling prefix inside this layer.
    fn prepend_strings(&self) -> bool {
        true
    }

    /// Delegates to the inner layer.
    async fn around(
        &self,
        call: &mut Call,
        next: &Arc<dyn TaskFunction>,
    ) -> Result<ArgValue, TaskError> {
        next.invoke(call).await
    }

    /// Wraps `inner` with this annotation.
    fn decorate(self, runtime: &Runtime, inner: Arc<dyn TaskFunction>) -> Arc<dyn TaskFunction>
    where
        Self: Sized,
    {
        Arc::new(Decorator::new(self, runtime, inner))
    }
}

/// An annotation applied to one function.
pub struct Decorator<A: Annotation> {
    annotation: A,
    decorated_in: ExecutionContext,
    configured: Arc<AtomicBool>,
    gate: ConfigurationGate,
    inner: Arc<dyn TaskFunction>,
    signature: FunctionSignature,
}

impl<A: Annotation> Decorator<A> {
    pub fn new(annotation: A, runtime: &Runtime, inner: Arc<dyn TaskFunction>) -> Self {
        let decorated_in = runtime.context();
        if decorated_in.in_scope() {
            log::debug!("Init {} decorator...", annotation.name());
        }
        let signature = inner.signature().clone();
        let gate = inner.configuration_gate().cloned().unwrap_or_default();
        Self {
            annotation,
            decorated_in,
            configured: Arc::new(AtomicBool::new(false)),
            gate,
            inner,
            signature,
        }
    }

    pub fn annotation(&self) -> &A {
        &self.annotation
    }

    /// The execution context at decoration time. Only kept for diagnostics:
    /// gating always follows the context of the call.
    pub fn decorated_in(&self) -> ExecutionContext {
        self.decorated_in
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }
}

impl<A: Annotation> fmt::Debug for Decorator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator")
            .field("annotation", &self.annotation.name())
            .field("arguments", self.annotation.arguments())
            .field("decorated_in", &self.decorated_in)
            .field("configured", &self.is_configured())
            .field("signature", &self.signature)
            .finish()
    }
}

#[async_trait]
impl<A: Annotation> TaskFunction for Decorator<A> {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn configuration_gate(&self) -> Option<&ConfigurationGate> {
        Some(&self.gate)
    }

    async fn invoke(&self, call: &mut Call) -> Result<ArgValue, TaskError> {
        let name = self.annotation.name();
        let context = call.context();
        if !context.admits_calls() {
            return Err(TaskError::OutOfScope {
                decorator: name.to_string(),
            });
        }
        log::debug!("Executing {} wrapper.", name);

        if context.configures() && !self.is_configured() {
            call.hold_configuration(&self.gate).await;
            // A concurrent first call may have committed while this one waited.
            if !self.is_configured() {
                log::debug!("Configuring {} core element.", name);
                self.annotation
                    .configure(call.core_element(), &self.signature)?;
                call.defer_configuration(self.configured.clone());
            }
        }
        self.annotation.prepare(call, &self.signature)?;

        let mut scoped = call.enter_frame(self.annotation.prepend_strings());
        self.annotation.around(&mut scoped, &self.inner).await
    }
}

type Layer = Box<dyn FnOnce(Arc<dyn TaskFunction>) -> Arc<dyn TaskFunction> + Send>;

/// Applies annotations in source order: the first one added is the outermost
/// wrapper and runs first.
pub struct AnnotationStack {
    runtime: Runtime,
    layers: Vec<Layer>,
    names: Vec<&'static str>,
}

impl AnnotationStack {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            layers: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn with<A: Annotation>(mut self, annotation: A) -> Self {
        let runtime = self.runtime.clone();
        self.names.push(annotation.name());
        self.layers
            .push(Box::new(move |inner| annotation.decorate(&runtime, inner)));
        self
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn apply(self, function: impl TaskFunction + 'static) -> Arc<dyn TaskFunction> {
        self.apply_arc(Arc::new(function))
    }

    pub fn apply_arc(self, function: Arc<dyn TaskFunction>) -> Arc<dyn TaskFunction> {
        self.layers
            .into_iter()
            .rev()
            .fold(function, |inner, layer| layer(inner))
    }
}

impl fmt::Debug for AnnotationStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationStack")
            .field("layers", &self.names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::Arguments;
    use crate::core::element::Hook;
    use crate::core::function::UserFunction;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Writes an auxiliary field and records what it saw.
    struct Probe {
        name: &'static str,
        arguments: DecoratorArguments,
        configured: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Probe {
        fn new(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                name,
                arguments: DecoratorArguments::new(),
                configured: Arc::new(AtomicUsize::new(0)),
                order: order.clone(),
            }
        }
    }

    #[async_trait]
    impl Annotation for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn arguments(&self) -> &DecoratorArguments {
            &self.arguments
        }

        fn configure(
            &self,
            element: &mut CoreElementBuilder,
            _function: &FunctionSignature,
        ) -> Result<(), TaskError> {
            self.configured.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.name);
            element.set_prolog(Hook::new(self.name, "", "false"));
            Ok(())
        }
    }

    fn body() -> UserFunction {
        UserFunction::new(FunctionSignature::new("m", "f").param("x"), |inv| {
            Ok(inv.arg("x").cloned().unwrap_or_default())
        })
    }

    #[tokio::test]
    async fn test_out_of_scope_never_runs_body() {
        let runtime = Runtime::local();
        let ran = Arc::new(AtomicBool::new(false));
        let seen = ran.clone();
        let order = Arc::new(Mutex::new(Vec::new()));
        let f = AnnotationStack::new(&runtime)
            .with(Probe::new("@probe", &order))
            .apply(UserFunction::new(FunctionSignature::new("m", "f"), move |_| {
                seen.store(true, Ordering::SeqCst);
                Ok(ArgValue::Null)
            }));
        let err = f.call(&runtime, Arguments::new()).await.unwrap_err();
        assert!(err.is_out_of_scope());
        assert!(!ran.load(Ordering::SeqCst));
        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outermost_configures_first_and_only_once() {
        let runtime = Runtime::local();
        runtime.reset_context(ExecutionContext::master());
        let order = Arc::new(Mutex::new(Vec::new()));
        let outer = Probe::new("@outer", &order);
        let inner = Probe::new("@inner", &order);
        let outer_count = outer.configured.clone();
        let f = AnnotationStack::new(&runtime)
            .with(outer)
            .with(inner)
            .apply(body());

        for x in [1, 2, 3] {
            let out = f.call(&runtime, Arguments::new().arg(x)).await.unwrap();
            assert_eq!(out, json!(x));
        }
        assert_eq!(*order.lock().unwrap(), vec!["@outer", "@inner"]);
        assert_eq!(outer_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_plain_worker_skips_configuration() {
        let runtime = Runtime::local();
        runtime.reset_context(ExecutionContext::worker());
        let order = Arc::new(Mutex::new(Vec::new()));
        let f = AnnotationStack::new(&runtime)
            .with(Probe::new("@probe", &order))
            .apply(body());
        let out = f.call(&runtime, Arguments::new().kwarg("x", 7)).await.unwrap();
        assert_eq!(out, json!(7));
        assert!(order.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stack_preserves_signature() {
        let runtime = Runtime::local();
        let order = Arc::new(Mutex::new(Vec::new()));
        let stack = AnnotationStack::new(&runtime)
            .with(Probe::new("@a", &order))
            .with(Probe::new("@b", &order));
        assert_eq!(stack.names(), ["@a", "@b"]);
        let f = stack.apply(body());
        assert_eq!(f.signature().qualified_name(), "m.f");
        assert_eq!(f.signature().position("x"), Some(0));
    }

    #[test]
    fn test_layers_of_one_stack_share_a_gate() {
        let runtime = Runtime::local();
        let order = Arc::new(Mutex::new(Vec::new()));
        let base: Arc<dyn TaskFunction> = Arc::new(body());
        assert!(base.configuration_gate().is_none());

        let inner = Probe::new("@inner", &order).decorate(&runtime, base.clone());
        let outer = Probe::new("@outer", &order).decorate(&runtime, inner.clone());
        let other = Probe::new("@other", &order).decorate(&runtime, base);

        let gate = inner.configuration_gate().unwrap();
        assert!(gate.same_as(outer.configuration_gate().unwrap()));
        assert!(!gate.same_as(other.configuration_gate().unwrap()));
    }
}
