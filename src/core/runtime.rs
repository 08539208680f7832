//! The runtime: execution context, scheduler and transform registry bundled
//! behind one cheap handle.

use crate::core::context::{ExecutionContext, Scope};
use crate::core::error::TaskError;
use crate::core::scheduler::{LocalScheduler, Scheduler};
use crate::core::transform::TransformRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

pub const ENV_SCOPE: &str = "TASKWEAVE_SCOPE";
pub const ENV_NESTING: &str = "TASKWEAVE_NESTING";
pub const ENV_RUN_HOOKS: &str = "TASKWEAVE_RUN_HOOKS";
pub const ENV_MAX_COMPUTING_UNITS: &str = "TASKWEAVE_MAX_COMPUTING_UNITS";

// ============================================================================
// Configuration
// ============================================================================

/// How a runtime is set up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scope to bootstrap into. `OutOfScope` skips bootstrap.
    pub scope: Scope,
    pub nesting: bool,
    /// Run prolog/epilog binaries in the local scheduler.
    pub run_hooks: bool,
    pub max_computing_units: Option<u64>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_nesting(mut self, nesting: bool) -> Self {
        self.nesting = nesting;
        self
    }

    pub fn with_run_hooks(mut self, run_hooks: bool) -> Self {
        self.run_hooks = run_hooks;
        self
    }

    pub fn with_max_computing_units(mut self, max: u64) -> Self {
        self.max_computing_units = Some(max);
        self
    }

    /// Reads `TASKWEAVE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, TaskError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), with variables read through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TaskError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(scope) = lookup(ENV_SCOPE) {
            config.scope = scope.parse().map_err(TaskError::Bootstrap)?;
        }
        if let Some(nesting) = lookup(ENV_NESTING) {
            config.nesting = parse_flag(ENV_NESTING, &nesting)?;
        }
        if let Some(run_hooks) = lookup(ENV_RUN_HOOKS) {
            config.run_hooks = parse_flag(ENV_RUN_HOOKS, &run_hooks)?;
        }
        if let Some(max) = lookup(ENV_MAX_COMPUTING_UNITS) {
            let max = max.trim().parse().map_err(|_| {
                TaskError::Bootstrap(format!("{ENV_MAX_COMPUTING_UNITS} must be an integer"))
            })?;
            config.max_computing_units = Some(max);
        }
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TaskError::Bootstrap(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| TaskError::Bootstrap(format!("{}: {}", path.display(), e)))
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, TaskError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(TaskError::Bootstrap(format!(
            "{name} must be a boolean, found `{other}`"
        ))),
    }
}

// ============================================================================
// Runtime
// ============================================================================

struct RuntimeInner {
    context: RwLock<ExecutionContext>,
    bootstrapped: AtomicBool,
    scheduler: Arc<dyn Scheduler>,
    transforms: TransformRegistry,
    config: RuntimeConfig,
}

/// Shared handle to the process's execution context and scheduler. Clones
/// share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// A runtime handing tasks to `scheduler`, not yet bootstrapped.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, RuntimeConfig::default())
    }

    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: RuntimeConfig) -> Self {
        let context = ExecutionContext::out_of_scope().with_nesting(config.nesting);
        Self {
            inner: Arc::new(RuntimeInner {
                context: RwLock::new(context),
                bootstrapped: AtomicBool::new(false),
                scheduler,
                transforms: TransformRegistry::new(),
                config,
            }),
        }
    }

    /// A runtime backed by a fresh [`LocalScheduler`].
    pub fn local() -> Self {
        Self::new(Arc::new(LocalScheduler::new()))
    }

    /// Builds a [`LocalScheduler`] from `config` and bootstraps into
    /// `config.scope` unless it is `OutOfScope`.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, TaskError> {
        let scheduler = LocalScheduler::new()
            .with_run_hooks(config.run_hooks)
            .with_max_computing_units(config.max_computing_units);
        let runtime = Self::with_config(Arc::new(scheduler), config.clone());
        if config.scope != Scope::OutOfScope {
            runtime.bootstrap(config.scope, config.nesting)?;
        }
        Ok(runtime)
    }

    /// A snapshot of the current execution context.
    pub fn context(&self) -> ExecutionContext {
        *self.inner.context.read().expect("context poisoned")
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.inner.transforms
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.inner.bootstrapped.load(Ordering::Acquire)
    }

    /// Enters `scope`. Allowed once per runtime.
    pub fn bootstrap(&self, scope: Scope, nesting: bool) -> Result<(), TaskError> {
        if scope == Scope::OutOfScope {
            return Err(TaskError::Bootstrap(
                "cannot bootstrap into out_of_scope".to_string(),
            ));
        }
        if self
            .inner
            .bootstrapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TaskError::Bootstrap(format!(
                "runtime already bootstrapped as {}",
                self.context().scope()
            )));
        }
        *self.inner.context.write().expect("context poisoned") =
            ExecutionContext::new(scope, nesting);
        log::debug!("Runtime bootstrapped as {} (nesting: {})", scope, nesting);
        Ok(())
    }

    /// Leaves the bootstrapped scope. The runtime cannot be bootstrapped again.
    pub fn teardown(&self) -> Result<(), TaskError> {
        if !self.is_bootstrapped() {
            return Err(TaskError::Bootstrap(
                "runtime was never bootstrapped".to_string(),
            ));
        }
        let mut context = self.inner.context.write().expect("context poisoned");
        log::debug!("Runtime leaving {}", context.scope());
        *context = ExecutionContext::out_of_scope();
        Ok(())
    }

    /// Replaces the execution context and forgets any bootstrap. Meant for
    /// tests moving between scopes.
    pub fn reset_context(&self, context: ExecutionContext) {
        *self.inner.context.write().expect("context poisoned") = context;
        self.inner.bootstrapped.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("context", &self.context())
            .field("bootstrapped", &self.is_bootstrapped())
            .field("transforms", &self.inner.transforms)
            .field("config", &self.inner.config)
            .finish()
    }
}
