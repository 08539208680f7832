use crate::core::ArgValue;
use crate::core::arguments::Arguments;
use crate::core::context::ExecutionContext;
use crate::core::element::CoreElement;
use crate::core::error::TaskError;
use crate::core::hooks::run_hook;
use crate::core::scheduler::{AsyncUnit, Scheduler, TaskOptions, TaskRequest, UnitHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const COMPUTING_UNITS: &str = "computing_units";

/// One accepted task registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub function: String,
    pub descriptor: Arc<CoreElement>,
    /// The arguments as registered, before transformed values arrived.
    pub arguments: Arguments,
    /// Parameters waiting on an asynchronous unit at registration time.
    pub pending: Vec<String>,
    pub options: TaskOptions,
    pub prepend_strings: bool,
}

/// One submitted asynchronous unit.
#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub id: Uuid,
    pub name: String,
    pub input: ArgValue,
    pub submitted_at: DateTime<Utc>,
}

/// Executes registered tasks inside the current process.
///
/// Every registration and unit is kept in memory so callers can inspect what
/// the annotation stack produced.
pub struct LocalScheduler {
    run_hooks: bool,
    max_computing_units: Option<u64>,
    registrations: Mutex<Vec<Registration>>,
    units: Mutex<Vec<UnitRecord>>,
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self {
            run_hooks: false,
            max_computing_units: None,
            registrations: Mutex::new(Vec::new()),
            units: Mutex::new(Vec::new()),
        }
    }

    /// Run prolog and epilog binaries around each task body.
    pub fn with_run_hooks(mut self, run_hooks: bool) -> Self {
        self.run_hooks = run_hooks;
        self
    }

    /// Reject tasks asking for more `computing_units` than this.
    pub fn with_max_computing_units(mut self, max: Option<u64>) -> Self {
        self.max_computing_units = max;
        self
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations
            .lock()
            .expect("registrations poisoned")
            .clone()
    }

    pub fn last_registration(&self) -> Option<Registration> {
        self.registrations
            .lock()
            .expect("registrations poisoned")
            .last()
            .cloned()
    }

    pub fn units(&self) -> Vec<UnitRecord> {
        self.units.lock().expect("units poisoned").clone()
    }

    fn validate(&self, request: &TaskRequest) -> Result<(), TaskError> {
        let descriptor = &request.descriptor;
        if descriptor.impl_kind().is_none() || descriptor.impl_signature().is_none() {
            return Err(TaskError::Registration(format!(
                "{} has no implementation",
                request.signature.qualified_name()
            )));
        }
        if let (Some(max), Some(requested)) = (
            self.max_computing_units,
            descriptor.constraint(COMPUTING_UNITS).and_then(as_units),
        ) {
            if requested > max {
                return Err(TaskError::Registration(format!(
                    "{} requests {} computing units, only {} available",
                    request.signature.qualified_name(),
                    requested,
                    max
                )));
            }
        }
        Ok(())
    }

    fn record(&self, request: &TaskRequest) -> Uuid {
        let id = Uuid::new_v4();
        let registration = Registration {
            id,
            registered_at: Utc::now(),
            function: request.signature.qualified_name(),
            descriptor: request.descriptor.clone(),
            arguments: request.arguments.clone(),
            pending: request
                .dependencies
                .iter()
                .map(|d| d.parameter.clone())
                .collect(),
            options: request.options.clone(),
            prepend_strings: request.prepend_strings(),
        };
        self.registrations
            .lock()
            .expect("registrations poisoned")
            .push(registration);
        id
    }
}

fn as_units(value: &ArgValue) -> Option<u64> {
    match value {
        ArgValue::Number(n) => n.as_u64(),
        ArgValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    async fn register(&self, mut request: TaskRequest) -> Result<ArgValue, TaskError> {
        self.validate(&request)?;
        let id = self.record(&request);
        log::debug!(
            "Registered {} as {} ({})",
            request.signature.qualified_name(),
            request
                .descriptor
                .impl_signature()
                .unwrap_or_default(),
            id
        );

        request.resolve().await?;

        let descriptor = request.descriptor.clone();
        let context =
            ExecutionContext::worker().with_nesting(request.runtime.context().nesting_enabled());

        if self.run_hooks {
            if let Some(prolog) = descriptor.prolog() {
                run_hook(prolog).await?;
            }
        }
        let result = request.execute(context).await?;
        if self.run_hooks {
            if let Some(epilog) = descriptor.epilog() {
                run_hook(epilog).await?;
            }
        }
        Ok(result)
    }

    fn submit(&self, unit: AsyncUnit) -> UnitHandle {
        let id = unit.id();
        let name = unit.name().to_string();
        self.units.lock().expect("units poisoned").push(UnitRecord {
            id,
            name: name.clone(),
            input: unit.input().clone(),
            submitted_at: Utc::now(),
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn_blocking(move || unit.run());
                let label = name.clone();
                UnitHandle::new(id, name, async move {
                    match join.await {
                        Ok(result) => result,
                        Err(e) => Err(TaskError::execution(format!("unit {label} failed: {e}"))),
                    }
                })
            }
            // Outside a tokio runtime the unit runs when its result is awaited.
            Err(_) => UnitHandle::new(id, name, async move { unit.run() }),
        }
    }
}
