use crate::annotations::container::complete_container_args;
use crate::core::ArgValue;
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments, type_name};
use crate::core::call::Call;
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElement, CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::{FunctionSignature, TaskFunction};
use crate::core::normalize::COMPUTING_NODES;
use crate::core::scheduler::{TaskOptions, TaskRequest};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

const RETURNS: &str = "returns";
const PRIORITY: &str = "priority";
const TIME_OUT: &str = "time_out";
const ON_FAILURE: &str = "on_failure";
const IS_REPLICATED: &str = "is_replicated";
const IS_DISTRIBUTED: &str = "is_distributed";
const IS_REDUCE: &str = "is_reduce";
const CHUNK_SIZE: &str = "chunk_size";
const IS_WORKFLOW: &str = "is_workflow";

const RULES: ArgumentRules = ArgumentRules::new(
    &[],
    &[
        RETURNS,
        PRIORITY,
        TIME_OUT,
        ON_FAILURE,
        IS_REPLICATED,
        IS_DISTRIBUTED,
        IS_REDUCE,
        CHUNK_SIZE,
        COMPUTING_NODES,
        IS_WORKFLOW,
    ],
    &[],
);

const ON_FAILURE_POLICIES: [&str; 4] = ["RETRY", "CANCEL_SUCCESSORS", "FAIL", "IGNORE"];

/// `@task`: turns the decorated function into a task. It must be the
/// innermost annotation of a stack, since it freezes the descriptor the outer
/// ones have built and registers it.
pub struct Task {
    arguments: DecoratorArguments,
    options: TaskOptions,
    descriptor: RwLock<Option<Arc<CoreElement>>>,
}

fn flag(arguments: &DecoratorArguments, name: &str) -> Result<bool, ConfigurationError> {
    match arguments.get(name) {
        None => Ok(false),
        Some(ArgValue::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(name, "a boolean", other)),
    }
}

fn count(arguments: &DecoratorArguments, name: &str) -> Result<u64, ConfigurationError> {
    match arguments.get(name) {
        None => Ok(0),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| invalid(name, "a non-negative integer", value)),
    }
}

fn invalid(name: &str, expected: &str, found: &ArgValue) -> ConfigurationError {
    ConfigurationError::InvalidArgumentType {
        decorator: Task::NAME.to_string(),
        argument: name.to_string(),
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    }
}

impl Task {
    pub const NAME: &'static str = "@task";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;

        let mut options = TaskOptions::default();
        if let Some(returns) = arguments.get(RETURNS) {
            options.returns = returns.clone();
        }
        if let Some(nodes) = arguments.get(COMPUTING_NODES) {
            options.computing_nodes = nodes.clone();
        }
        if let Some(policy) = arguments.get(ON_FAILURE) {
            let policy = policy
                .as_str()
                .filter(|p| ON_FAILURE_POLICIES.contains(p))
                .ok_or_else(|| {
                    invalid(
                        ON_FAILURE,
                        "one of RETRY, CANCEL_SUCCESSORS, FAIL, IGNORE",
                        policy,
                    )
                })?;
            options.on_failure = policy.to_string();
        }
        options.priority = flag(&arguments, PRIORITY)?;
        options.is_replicated = flag(&arguments, IS_REPLICATED)?;
        options.is_distributed = flag(&arguments, IS_DISTRIBUTED)?;
        options.is_reduce = flag(&arguments, IS_REDUCE)?;
        options.is_workflow = flag(&arguments, IS_WORKFLOW)?;
        options.time_out = count(&arguments, TIME_OUT)?;
        options.chunk_size = count(&arguments, CHUNK_SIZE)?;

        Ok(Self {
            arguments,
            options,
            descriptor: RwLock::new(None),
        })
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// The descriptor registered by the first configured call, if any.
    pub fn descriptor(&self) -> Option<Arc<CoreElement>> {
        self.descriptor
            .read()
            .expect("task descriptor poisoned")
            .clone()
    }

    /// Freezes this call's descriptor, or reuses the one frozen on an earlier
    /// call when the stack is already configured.
    fn freeze(
        &self,
        call: &mut Call,
        function: &FunctionSignature,
    ) -> Result<Arc<CoreElement>, TaskError> {
        match call.take_core_element() {
            Some(builder) => {
                let frozen = builder.freeze();
                let mut cached = self.descriptor.write().expect("task descriptor poisoned");
                if cached.is_none() {
                    *cached = Some(frozen.clone());
                }
                Ok(frozen)
            }
            None => self.descriptor().ok_or_else(|| {
                TaskError::Registration(format!(
                    "no task descriptor was built for {}",
                    function.qualified_name()
                ))
            }),
        }
    }

    fn call_options(&self, call: &Call) -> TaskOptions {
        let mut options = self.options.clone();
        if let Some(nodes) = call.arguments().keyword(COMPUTING_NODES) {
            options.computing_nodes = nodes.clone();
        }
        options
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .field("descriptor", &self.descriptor())
            .finish()
    }
}

#[async_trait]
impl Annotation for Task {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn arguments(&self) -> &DecoratorArguments {
        &self.arguments
    }

    fn configure(
        &self,
        element: &mut CoreElementBuilder,
        function: &FunctionSignature,
    ) -> Result<(), TaskError> {
        if !element.has_primary() {
            element.set_implementation(
                Self::NAME,
                ImplementationKind::Method,
                function.qualified_name(),
                vec![function.module().to_string(), function.name().to_string()],
            )?;
        } else if element.view().impl_kind() == Some(ImplementationKind::Container) {
            let type_args = element.view().impl_type_args();
            if let Some(completed) = complete_container_args(type_args, function) {
                element.complete_type_args(completed);
            }
        }
        element.set_workflow(self.options.is_workflow);
        Ok(())
    }

    async fn around(
        &self,
        call: &mut Call,
        next: &Arc<dyn TaskFunction>,
    ) -> Result<ArgValue, TaskError> {
        if next.configuration_gate().is_some() {
            let function = next.signature().qualified_name();
            return Err(ConfigurationError::TaskNotInnermost(function).into());
        }
        if !call.context().configures() {
            log::debug!(
                "Running {} sequentially inside the current worker.",
                next.signature().qualified_name()
            );
            return next.invoke(call).await;
        }

        let descriptor = self.freeze(call, next.signature())?;
        call.commit_configuration();
        let request = TaskRequest {
            descriptor,
            signature: next.signature().clone(),
            arguments: call.arguments().clone(),
            dependencies: call.take_dependencies(),
            options: self.call_options(call),
            frame: call.effective_frame(),
            body: next.clone(),
            runtime: call.runtime().clone(),
        };
        let scheduler = call.runtime().scheduler().clone();
        scheduler.register(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Container;
    use serde_json::json;

    #[test]
    fn test_method_default() {
        let task = Task::new(json!({"returns": 1})).unwrap();
        let mut builder = CoreElementBuilder::new();
        task.configure(&mut builder, &FunctionSignature::new("app", "inc"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_kind(), Some(ImplementationKind::Method));
        assert_eq!(element.impl_signature(), Some("app.inc"));
        assert_eq!(element.impl_type_args(), ["app", "inc"]);
        assert_eq!(element.primary_owner(), Some("@task"));
    }

    #[test]
    fn test_existing_primary_is_kept_and_containers_completed() {
        let sig = FunctionSignature::new("app", "work");
        let mut builder = CoreElementBuilder::new();
        Container::new(json!({"engine": "DOCKER", "image": "img"}))
            .unwrap()
            .configure(&mut builder, &sig)
            .unwrap();
        Task::new(json!({})).unwrap().configure(&mut builder, &sig).unwrap();
        let element = builder.freeze();
        assert_eq!(element.primary_owner(), Some("@container"));
        assert_eq!(element.impl_type_args()[2], "CET_PYTHON");
        assert_eq!(element.impl_type_args()[4], "app&work");
    }

    #[test]
    fn test_options() {
        let task = Task::new(json!({
            "returns": 2,
            "priority": true,
            "time_out": 30,
            "on_failure": "IGNORE",
            "is_workflow": true,
        }))
        .unwrap();
        let options = task.options();
        assert_eq!(options.returns, json!(2));
        assert!(options.priority && options.is_workflow);
        assert_eq!(options.time_out, 30);
        assert_eq!(options.on_failure, "IGNORE");
        assert_eq!(options.computing_nodes, json!(1));
    }

    #[test]
    fn test_invalid_options() {
        assert!(matches!(
            Task::new(json!({"priority": "yes"})),
            Err(ConfigurationError::InvalidArgumentType { .. })
        ));
        assert!(matches!(
            Task::new(json!({"on_failure": "EXPLODE"})),
            Err(ConfigurationError::InvalidArgumentType { .. })
        ));
        assert!(matches!(
            Task::new(json!({"speed": 3})),
            Err(ConfigurationError::UnsupportedArgument { .. })
        ));
    }
}
