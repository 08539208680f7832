use crate::annotations::{Binary, Epilog, Mpi, Ompss, Prolog, required_string};
use crate::core::ArgValue;
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::{Annotation, Decorator};
use crate::core::element::CoreElementBuilder;
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::{FunctionSignature, TaskFunction};
use crate::core::runtime::Runtime;
use serde::Deserialize;
use serde_json::Map;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_FILE: &str = "config_file";

const RULES: ArgumentRules = ArgumentRules::new(&[CONFIG_FILE], &[], &[]);

#[derive(Debug, Deserialize)]
struct SoftwareConfig {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Map<String, ArgValue>,
    #[serde(default)]
    constraints: Option<Map<String, ArgValue>>,
    #[serde(default)]
    prolog: Option<Map<String, ArgValue>>,
    #[serde(default)]
    epilog: Option<Map<String, ArgValue>>,
}

/// The annotation a software description stands for.
#[derive(Debug, Clone)]
pub enum SoftwareKind {
    Mpi(Mpi),
    Binary(Binary),
    Ompss(Ompss),
}

impl SoftwareKind {
    fn from_config(
        kind: &str,
        properties: Map<String, ArgValue>,
    ) -> Result<Self, ConfigurationError> {
        match kind.to_ascii_lowercase().as_str() {
            "mpi" => Ok(SoftwareKind::Mpi(Mpi::new(properties)?)),
            "binary" => Ok(SoftwareKind::Binary(Binary::new(properties)?)),
            "ompss" => Ok(SoftwareKind::Ompss(Ompss::new(properties)?)),
            _ => Err(ConfigurationError::UnsupportedSoftwareType(kind.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SoftwareKind::Mpi(_) => Mpi::NAME,
            SoftwareKind::Binary(_) => Binary::NAME,
            SoftwareKind::Ompss(_) => Ompss::NAME,
        }
    }

    fn decorate(self, runtime: &Runtime, inner: Arc<dyn TaskFunction>) -> Arc<dyn TaskFunction> {
        match self {
            SoftwareKind::Mpi(a) => a.decorate(runtime, inner),
            SoftwareKind::Binary(a) => a.decorate(runtime, inner),
            SoftwareKind::Ompss(a) => a.decorate(runtime, inner),
        }
    }
}

/// `@software`: a task whose implementation is described by a JSON file.
///
/// ```json
/// {
///   "type": "mpi",
///   "properties": {"runner": "mpirun", "binary": "solver"},
///   "constraints": {"computing_units": 4},
///   "prolog": {"binary": "mkdir", "params": "out"}
/// }
/// ```
///
/// The file is read once, when the annotation is built. Applying it wraps
/// the function with the described annotation and the optional hooks.
#[derive(Debug, Clone)]
pub struct Software {
    arguments: DecoratorArguments,
    config_file: PathBuf,
    kind: SoftwareKind,
    constraints: Map<String, ArgValue>,
    prolog: Option<Prolog>,
    epilog: Option<Epilog>,
}

fn invalid_file(path: &Path, reason: impl ToString) -> ConfigurationError {
    ConfigurationError::InvalidConfigFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl Software {
    pub const NAME: &'static str = "@software";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        let config_file = PathBuf::from(required_string(&arguments, CONFIG_FILE, Self::NAME)?);

        let raw = fs::read_to_string(&config_file).map_err(|e| invalid_file(&config_file, e))?;
        let config: SoftwareConfig =
            serde_json::from_str(&raw).map_err(|e| invalid_file(&config_file, e))?;
        log::debug!(
            "Software task from {} uses {}.",
            config_file.display(),
            config.kind
        );

        let kind = SoftwareKind::from_config(&config.kind, config.properties)?;
        let prolog = config.prolog.map(Prolog::new).transpose()?;
        let epilog = config.epilog.map(Epilog::new).transpose()?;
        Ok(Self {
            arguments,
            config_file,
            kind,
            constraints: config.constraints.unwrap_or_default(),
            prolog,
            epilog,
        })
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn kind(&self) -> &SoftwareKind {
        &self.kind
    }

    pub fn constraints(&self) -> &Map<String, ArgValue> {
        &self.constraints
    }
}

impl Annotation for Software {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn arguments(&self) -> &DecoratorArguments {
        &self.arguments
    }

    fn configure(
        &self,
        element: &mut CoreElementBuilder,
        _function: &FunctionSignature,
    ) -> Result<(), TaskError> {
        if !self.constraints.is_empty() {
            element.add_constraints(
                self.constraints
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
        }
        Ok(())
    }

    /// `@software` outermost, then prolog, epilog and the described
    /// annotation around `inner`.
    fn decorate(self, runtime: &Runtime, inner: Arc<dyn TaskFunction>) -> Arc<dyn TaskFunction> {
        let mut wrapped = self.kind.clone().decorate(runtime, inner);
        if let Some(epilog) = self.epilog.clone() {
            wrapped = epilog.decorate(runtime, wrapped);
        }
        if let Some(prolog) = self.prolog.clone() {
            wrapped = prolog.decorate(runtime, wrapped);
        }
        Arc::new(Decorator::new(self, runtime, wrapped))
    }
}
