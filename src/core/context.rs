use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the current process sits relative to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// No orchestrator is present (before bootstrap, or a plain process).
    #[default]
    OutOfScope,
    /// The orchestrating process.
    Master,
    /// A process executing tasks on behalf of the master.
    Worker,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::OutOfScope => "out_of_scope",
            Scope::Master => "master",
            Scope::Worker => "worker",
        };
        f.write_str(name)
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "out_of_scope" | "none" | "" => Ok(Scope::OutOfScope),
            "master" => Ok(Scope::Master),
            "worker" => Ok(Scope::Worker),
            other => Err(format!("unknown scope `{other}`")),
        }
    }
}

/// The execution context a call runs under: a scope plus the nesting flag that
/// lets workers orchestrate their own sub-tasks.
///
/// This is a plain value. The [`Runtime`](crate::Runtime) owns the process-wide
/// copy and hands a snapshot to every [`Call`](crate::Call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    scope: Scope,
    nesting: bool,
}

impl ExecutionContext {
    pub const fn new(scope: Scope, nesting: bool) -> Self {
        Self { scope, nesting }
    }

    pub const fn out_of_scope() -> Self {
        Self::new(Scope::OutOfScope, false)
    }

    pub const fn master() -> Self {
        Self::new(Scope::Master, false)
    }

    pub const fn worker() -> Self {
        Self::new(Scope::Worker, false)
    }

    pub const fn with_nesting(self, nesting: bool) -> Self {
        Self::new(self.scope, nesting)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn nesting_enabled(&self) -> bool {
        self.nesting
    }

    pub fn in_master(&self) -> bool {
        self.scope == Scope::Master
    }

    pub fn in_worker(&self) -> bool {
        self.scope == Scope::Worker
    }

    /// True when some orchestrator is present.
    pub fn in_scope(&self) -> bool {
        self.scope != Scope::OutOfScope
    }

    /// Annotated functions may only be invoked when this holds.
    pub fn admits_calls(&self) -> bool {
        self.in_scope() || self.nesting
    }

    /// Whether annotations configure the task descriptor under this context.
    pub fn configures(&self) -> bool {
        self.in_master() || self.nesting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_out_of_scope_without_nesting() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.scope(), Scope::OutOfScope);
        assert!(!ctx.nesting_enabled());
        assert!(!ctx.admits_calls());
        assert!(!ctx.configures());
    }

    #[test]
    fn test_plain_worker_runs_but_does_not_configure() {
        let ctx = ExecutionContext::worker();
        assert!(ctx.admits_calls());
        assert!(!ctx.configures());
    }

    #[test]
    fn test_nesting_turns_workers_into_orchestrators() {
        let ctx = ExecutionContext::worker().with_nesting(true);
        assert!(ctx.configures());
        let ctx = ExecutionContext::out_of_scope().with_nesting(true);
        assert!(ctx.admits_calls());
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("MASTER".parse::<Scope>(), Ok(Scope::Master));
        assert_eq!("worker".parse::<Scope>(), Ok(Scope::Worker));
        assert_eq!("out_of_scope".parse::<Scope>(), Ok(Scope::OutOfScope));
        assert!("driver".parse::<Scope>().is_err());
    }
}
