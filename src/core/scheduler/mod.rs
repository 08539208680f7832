//! The registration boundary between the annotation protocol and whatever
//! executes finished task descriptors.

pub mod local;

pub use local::{LocalScheduler, Registration, UnitRecord};

use crate::core::ArgValue;
use crate::core::arguments::Arguments;
use crate::core::call::{Call, CallFrame, DataDependency};
use crate::core::context::ExecutionContext;
use crate::core::element::CoreElement;
use crate::core::error::TaskError;
use crate::core::function::{FunctionSignature, TaskFunction};
use crate::core::runtime::Runtime;
use crate::core::transform::Transform;
use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt};
use futures::stream::{FuturesOrdered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Accepts finished task descriptors and auxiliary units.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Hands one frozen descriptor and its call over for execution.
    async fn register(&self, request: TaskRequest) -> Result<ArgValue, TaskError>;

    /// Starts an asynchronous unit and returns a handle to its result.
    fn submit(&self, unit: AsyncUnit) -> UnitHandle;
}

/// Task-level options declared on `@task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub returns: ArgValue,
    pub priority: bool,
    pub time_out: u64,
    pub on_failure: String,
    pub is_replicated: bool,
    pub is_distributed: bool,
    pub is_reduce: bool,
    pub chunk_size: u64,
    pub computing_nodes: ArgValue,
    pub is_workflow: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            returns: ArgValue::from(false),
            priority: false,
            time_out: 0,
            on_failure: "RETRY".to_string(),
            is_replicated: false,
            is_distributed: false,
            is_reduce: false,
            chunk_size: 0,
            computing_nodes: ArgValue::from(1),
            is_workflow: false,
        }
    }
}

/// Everything the scheduler receives for one task call.
pub struct TaskRequest {
    pub descriptor: Arc<CoreElement>,
    pub signature: FunctionSignature,
    pub arguments: Arguments,
    pub dependencies: Vec<DataDependency>,
    pub options: TaskOptions,
    /// The view the annotation layers opened over the call: receiver
    /// overrides and whether strings keep their prefix.
    pub frame: CallFrame,
    pub body: Arc<dyn TaskFunction>,
    pub runtime: Runtime,
}

impl TaskRequest {
    /// Waits for every transformed argument and writes it into place.
    pub async fn resolve(&mut self) -> Result<(), TaskError> {
        let dependencies = std::mem::take(&mut self.dependencies);
        resolve_dependencies(dependencies, &mut self.arguments).await
    }

    pub fn prepend_strings(&self) -> bool {
        self.frame.prepend_strings()
    }

    /// Resolves dependencies and runs the body under `context`, seen through
    /// the frame the annotation layers opened.
    pub async fn execute(mut self, context: ExecutionContext) -> Result<ArgValue, TaskError> {
        self.resolve().await?;
        let mut call =
            Call::with_context(&self.runtime, context, self.arguments).with_frame(self.frame);
        self.body.invoke(&mut call).await
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("descriptor", &self.descriptor)
            .field("signature", &self.signature)
            .field("arguments", &self.arguments)
            .field("dependencies", &self.dependencies.len())
            .field("options", &self.options)
            .field("frame", &self.frame)
            .finish()
    }
}

/// A transform to run off the caller's path.
pub struct AsyncUnit {
    id: Uuid,
    name: String,
    transform: Arc<dyn Transform>,
    input: ArgValue,
    kwargs: HashMap<String, ArgValue>,
}

impl AsyncUnit {
    pub fn new(
        name: impl Into<String>,
        transform: Arc<dyn Transform>,
        input: ArgValue,
        kwargs: HashMap<String, ArgValue>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            transform,
            input,
            kwargs,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &ArgValue {
        &self.input
    }

    pub fn run(self) -> Result<ArgValue, TaskError> {
        self.transform.apply(self.input, &self.kwargs)
    }
}

impl fmt::Debug for AsyncUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("input", &self.input)
            .finish()
    }
}

/// The pending result of an [`AsyncUnit`]. Dropping the handle aborts the
/// unit if it has not finished.
pub struct UnitHandle {
    id: Uuid,
    name: String,
    result: Option<BoxFuture<'static, Result<ArgValue, TaskError>>>,
    abort: AbortHandle,
}

impl UnitHandle {
    /// Wraps `future` so it can be aborted through the handle.
    pub fn new<F>(id: Uuid, name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<ArgValue, TaskError>> + Send + 'static,
    {
        let name = name.into();
        let (abort, registration) = AbortHandle::new_pair();
        let label = name.clone();
        let result = Abortable::new(future, registration)
            .map(move |outcome| outcome.unwrap_or_else(|_| Err(TaskError::Cancelled(label))))
            .boxed();
        Self {
            id,
            name,
            result: Some(result),
            abort,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub async fn wait(mut self) -> Result<ArgValue, TaskError> {
        match self.result.take() {
            Some(result) => result.await,
            None => Err(TaskError::Cancelled(self.name.clone())),
        }
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        if self.result.is_some() {
            self.abort.abort();
        }
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

/// Waits for all `dependencies` concurrently and substitutes their results.
/// The first failure is returned; the remaining units are aborted.
pub async fn resolve_dependencies(
    dependencies: Vec<DataDependency>,
    arguments: &mut Arguments,
) -> Result<(), TaskError> {
    let mut pending: FuturesOrdered<_> = dependencies
        .into_iter()
        .map(|dependency| async move {
            let DataDependency {
                parameter,
                slot,
                unit,
            } = dependency;
            unit.wait().await.map(|value| (parameter, slot, value))
        })
        .collect();

    while let Some(resolved) = pending.next().await {
        let (parameter, slot, value) = resolved?;
        log::debug!("Transformed argument `{}` is ready.", parameter);
        arguments.set(&slot, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::ArgSlot;
    use serde_json::json;

    fn dependency(parameter: &str, unit: UnitHandle) -> DataDependency {
        DataDependency {
            parameter: parameter.to_string(),
            slot: ArgSlot::Keyword(parameter.to_string()),
            unit,
        }
    }

    #[tokio::test]
    async fn test_dependencies_substituted() {
        let mut arguments = Arguments::new().kwarg("a", 0).kwarg("b", 0);
        let deps = vec![
            dependency("a", UnitHandle::new(Uuid::new_v4(), "a", async { Ok(json!(1)) })),
            dependency("b", UnitHandle::new(Uuid::new_v4(), "b", async { Ok(json!(2)) })),
        ];
        resolve_dependencies(deps, &mut arguments).await.unwrap();
        assert_eq!(arguments.keyword("a"), Some(&json!(1)));
        assert_eq!(arguments.keyword("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_dependency_failure_propagates() {
        let mut arguments = Arguments::new();
        let deps = vec![dependency(
            "a",
            UnitHandle::new(Uuid::new_v4(), "a", async {
                Err(TaskError::execution("boom"))
            }),
        )];
        let err = resolve_dependencies(deps, &mut arguments).await.unwrap_err();
        assert_eq!(err, TaskError::execution("boom"));
        assert!(arguments.keyword("a").is_none());
    }

    #[tokio::test]
    async fn test_aborted_unit_reports_cancellation() {
        let handle = UnitHandle::new(Uuid::new_v4(), "slow", async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(json!(null))
        });
        handle.abort();
        assert!(handle.is_aborted());
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err, TaskError::Cancelled("slow".to_string()));
    }
}
