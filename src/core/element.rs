use crate::core::ArgValue;
use crate::core::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a task is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImplementationKind {
    #[serde(rename = "METHOD")]
    Method,
    #[serde(rename = "BINARY")]
    Binary,
    #[serde(rename = "MPI")]
    Mpi,
    #[serde(rename = "OMPSS")]
    Ompss,
    #[serde(rename = "COMPSs")]
    Compss,
    #[serde(rename = "DECAF")]
    Decaf,
    #[serde(rename = "MULTI_NODE")]
    MultiNode,
    #[serde(rename = "CONTAINER")]
    Container,
}

impl ImplementationKind {
    /// The wire name, also used as signature prefix (`OMPSS.sleep`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ImplementationKind::Method => "METHOD",
            ImplementationKind::Binary => "BINARY",
            ImplementationKind::Mpi => "MPI",
            ImplementationKind::Ompss => "OMPSS",
            ImplementationKind::Compss => "COMPSs",
            ImplementationKind::Decaf => "DECAF",
            ImplementationKind::MultiNode => "MULTI_NODE",
            ImplementationKind::Container => "CONTAINER",
        }
    }
}

impl fmt::Display for ImplementationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary run before (prolog) or after (epilog) the task on the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub binary: String,
    pub params: String,
    pub fail_by_exit_value: String,
}

impl Hook {
    pub fn new(
        binary: impl Into<String>,
        params: impl Into<String>,
        fail_by_exit_value: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            params: params.into(),
            fail_by_exit_value: fail_by_exit_value.into(),
        }
    }

    /// `[binary, params, fail_by_exit_value]`, the registration layout.
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            self.binary.clone(),
            self.params.clone(),
            self.fail_by_exit_value.clone(),
        ]
    }
}

impl PartialEq<(&str, &str, &str)> for Hook {
    fn eq(&self, other: &(&str, &str, &str)) -> bool {
        self.binary == other.0 && self.params == other.1 && self.fail_by_exit_value == other.2
    }
}

/// The frozen description of how a task executes.
///
/// Built by the annotations of one call through a [`CoreElementBuilder`] and
/// handed to the scheduler as an `Arc<CoreElement>`; it has no mutators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreElement {
    id: Uuid,
    impl_kind: Option<ImplementationKind>,
    impl_signature: Option<String>,
    impl_type_args: Vec<String>,
    prolog: Option<Hook>,
    epilog: Option<Hook>,
    constraints: BTreeMap<String, ArgValue>,
    workflow: bool,
    primary_owner: Option<String>,
}

impl CoreElement {
    /// The id of the builder this descriptor was frozen from.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn impl_kind(&self) -> Option<ImplementationKind> {
        self.impl_kind
    }

    pub fn impl_signature(&self) -> Option<&str> {
        self.impl_signature.as_deref()
    }

    pub fn impl_type_args(&self) -> &[String] {
        &self.impl_type_args
    }

    pub fn prolog(&self) -> Option<&Hook> {
        self.prolog.as_ref()
    }

    pub fn epilog(&self) -> Option<&Hook> {
        self.epilog.as_ref()
    }

    pub fn constraints(&self) -> &BTreeMap<String, ArgValue> {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&ArgValue> {
        self.constraints.get(name)
    }

    pub fn is_workflow(&self) -> bool {
        self.workflow
    }

    /// The annotation that wrote the primary field-set, if any.
    pub fn primary_owner(&self) -> Option<&str> {
        self.primary_owner.as_deref()
    }

    /// True when the primary field-set has been written.
    pub fn is_complete(&self) -> bool {
        self.impl_kind.is_some() && self.impl_signature.is_some()
    }
}

/// The mutable descriptor shared by the annotation layers of one call.
#[derive(Debug)]
pub struct CoreElementBuilder {
    id: Uuid,
    element: CoreElement,
}

impl Default for CoreElementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreElementBuilder {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            element: CoreElement {
                id,
                ..CoreElement::default()
            },
        }
    }

    /// Identifies this instance; distinct for every builder ever created.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_primary(&self) -> bool {
        self.element.primary_owner.is_some()
    }

    pub fn view(&self) -> &CoreElement {
        &self.element
    }

    /// Writes the primary field-set. Only one annotation per descriptor may do this.
    pub fn set_implementation(
        &mut self,
        owner: &str,
        kind: ImplementationKind,
        signature: impl Into<String>,
        type_args: Vec<String>,
    ) -> Result<(), ConfigurationError> {
        if let Some(existing) = &self.element.primary_owner {
            return Err(ConfigurationError::PrimaryConflict {
                owner: existing.clone(),
                attempted: owner.to_string(),
            });
        }
        self.element.impl_kind = Some(kind);
        self.element.impl_signature = Some(signature.into());
        self.element.impl_type_args = type_args;
        self.element.primary_owner = Some(owner.to_string());
        Ok(())
    }

    /// Replaces the type-arguments of an already-claimed primary field-set.
    /// Used by `@task` to complete container descriptors.
    pub(crate) fn complete_type_args(&mut self, type_args: Vec<String>) {
        self.element.impl_type_args = type_args;
    }

    pub fn set_prolog(&mut self, hook: Hook) {
        if self.element.prolog.is_some() {
            log::warn!("Replacing an existing prolog with `{}`", hook.binary);
        }
        self.element.prolog = Some(hook);
    }

    pub fn set_epilog(&mut self, hook: Hook) {
        if self.element.epilog.is_some() {
            log::warn!("Replacing an existing epilog with `{}`", hook.binary);
        }
        self.element.epilog = Some(hook);
    }

    pub fn add_constraints<I>(&mut self, constraints: I)
    where
        I: IntoIterator<Item = (String, ArgValue)>,
    {
        for (name, value) in constraints {
            if let Some(previous) = self.element.constraints.insert(name.clone(), value) {
                log::warn!(
                    "Constraint {} was already set to {}, overwriting it.",
                    name,
                    previous
                );
            }
        }
    }

    pub fn set_workflow(&mut self, workflow: bool) {
        self.element.workflow = workflow;
    }

    pub fn freeze(self) -> Arc<CoreElement> {
        Arc::new(self.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_ids_are_unique() {
        let a = CoreElementBuilder::new();
        let b = CoreElementBuilder::new();
        assert_ne!(a.id(), b.id());
        let id = a.id();
        assert_eq!(a.freeze().id(), id);
    }

    #[test]
    fn test_primary_fields_written_once() {
        let mut builder = CoreElementBuilder::new();
        builder
            .set_implementation(
                "@ompss",
                ImplementationKind::Ompss,
                "OMPSS.sleep",
                vec!["sleep".into()],
            )
            .unwrap();
        let err = builder
            .set_implementation("@binary", ImplementationKind::Binary, "BINARY.ls", vec![])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::PrimaryConflict {
                owner: "@ompss".to_string(),
                attempted: "@binary".to_string(),
            }
        );
        let element = builder.freeze();
        assert_eq!(element.impl_kind(), Some(ImplementationKind::Ompss));
        assert_eq!(element.impl_signature(), Some("OMPSS.sleep"));
    }

    #[test]
    fn test_auxiliary_fields_do_not_touch_primary() {
        let mut builder = CoreElementBuilder::new();
        builder
            .set_implementation("@binary", ImplementationKind::Binary, "BINARY.ls", vec![])
            .unwrap();
        builder.set_prolog(Hook::new("echo", "hi", "false"));
        builder.add_constraints([("computing_units".to_string(), json!(2))]);
        builder.add_constraints([("memory_size".to_string(), json!(4))]);
        let element = builder.freeze();
        assert_eq!(element.primary_owner(), Some("@binary"));
        assert!(element.prolog().unwrap() == &("echo", "hi", "false"));
        assert_eq!(element.constraints().len(), 2);
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(ImplementationKind::Compss.as_str(), "COMPSs");
        assert_eq!(
            serde_json::to_value(ImplementationKind::MultiNode).unwrap(),
            json!("MULTI_NODE")
        );
    }
}
