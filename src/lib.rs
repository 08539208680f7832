//! # Taskweave
//!
//! A composable task-annotation protocol. Annotations stacked on a function
//! cooperate to build exactly one immutable task descriptor per call, which is
//! then handed to a scheduler.
//!
//! ## Features
//!
//! - **One Descriptor per Call**: Every layer of a stack writes into the same
//!   builder, frozen into an `Arc<CoreElement>` at registration
//! - **Explicit Context**: Master, worker and out-of-scope behaviour follow a
//!   plain value owned by the [`Runtime`], never ambient globals
//! - **Argument Normalization**: Legacy camelCase spellings, defaults and
//!   coercions are settled when an annotation is built
//! - **Data Transformations**: Arguments can be replaced inline or through
//!   asynchronous units the task waits on
//! - **Local Scheduler**: An in-process scheduler that records every
//!   registration, handy for tests and single-process runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskweave::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), TaskError> {
//! let runtime = Runtime::from_config(RuntimeConfig::new().with_scope(Scope::Master))?;
//!
//! let inc = UserFunction::new(taskweave::signature!("app.inc(x)"), |inv| {
//!     Ok(json!(inv.require("x")?.as_i64().unwrap_or_default() + 1))
//! });
//!
//! let task = AnnotationStack::new(&runtime)
//!     .with(Constraint::new(json!({"computing_units": 2}))?)
//!     .with(Task::new(json!({"returns": 1}))?)
//!     .apply(inc);
//!
//! let result = task.call(&runtime, Arguments::new().arg(41)).await?;
//! assert_eq!(result, json!(42));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: Context, descriptor, call state, decorator lifecycle and the
//!   scheduler boundary
//! - [`annotations`]: The annotation types (`@task`, `@mpi`, `@binary`, ...)
//! - [`prelude`]: Commonly used types and traits (import with `use taskweave::prelude::*`)

// ============================================================================
// Modules
// ============================================================================

pub mod annotations;
pub mod core;

// ============================================================================
// Public Re-exports
// ============================================================================

// Core types
pub use crate::core::ArgValue;
pub use crate::core::arguments::{ArgSlot, Arguments, DecoratorArguments};
pub use crate::core::call::{Call, CallFrame, ConfigurationGate, DataDependency};
pub use crate::core::context::{ExecutionContext, Scope};
pub use crate::core::decorator::{Annotation, AnnotationStack, Decorator};
pub use crate::core::element::{CoreElement, CoreElementBuilder, Hook, ImplementationKind};
pub use crate::core::error::{ConfigurationError, TaskError, TransformationError};
pub use crate::core::function::{
    FunctionSignature, Invocation, Parameter, TaskFunction, UserFunction,
};
pub use crate::core::runtime::{Runtime, RuntimeConfig};

// Scheduling
pub use crate::core::scheduler::{
    AsyncUnit, LocalScheduler, Registration, Scheduler, TaskOptions, TaskRequest, UnitHandle,
};

// Transformations
pub use crate::core::transform::{Transform, TransformFn, TransformRegistry, TransformationSpec};

// ============================================================================
// Prelude
// ============================================================================

/// Everything needed to declare and call annotated tasks.
///
/// # Example
/// ```rust
/// use taskweave::prelude::*;
/// ```
pub mod prelude {
    pub use super::annotations::{
        Binary, Compss, Constraint, Container, DataTransformation, Decaf, Epilog, Implement, Mpi,
        MultiNode, Ompss, Prolog, Software, Task,
    };
    pub use super::{
        Annotation, AnnotationStack, ArgValue, Arguments, Call, ConfigurationError,
        ExecutionContext, FunctionSignature, LocalScheduler, Runtime, RuntimeConfig, Scheduler,
        Scope, TaskError, TaskFunction, TransformFn, TransformationSpec, UserFunction,
    };
}

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
