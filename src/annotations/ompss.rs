use crate::annotations::{BINARY, inject_computing_nodes, required_string};
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::call::Call;
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::{
    COMPUTING_NODES, FAIL_BY_EXIT_VALUE, LEGACY_COMPUTING_NODES, LEGACY_WORKING_DIR, WORKING_DIR,
    process_computing_nodes, resolve_fail_by_exit_value, resolve_working_dir,
};

const RULES: ArgumentRules = ArgumentRules::new(
    &[BINARY],
    &[COMPUTING_NODES, WORKING_DIR, FAIL_BY_EXIT_VALUE],
    &[LEGACY_COMPUTING_NODES, LEGACY_WORKING_DIR],
);

/// `@ompss`: the task is an OmpSs binary.
#[derive(Debug, Clone)]
pub struct Ompss {
    arguments: DecoratorArguments,
    binary: String,
}

impl Ompss {
    pub const NAME: &'static str = "@ompss";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        process_computing_nodes(&mut arguments, Self::NAME);
        resolve_working_dir(&mut arguments);
        resolve_fail_by_exit_value(&mut arguments, Self::NAME)?;
        let binary = required_string(&arguments, BINARY, Self::NAME)?;
        Ok(Self { arguments, binary })
    }
}

impl Annotation for Ompss {
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
        let type_args = vec![
            self.binary.clone(),
            required_string(&self.arguments, WORKING_DIR, Self::NAME)?,
            required_string(&self.arguments, FAIL_BY_EXIT_VALUE, Self::NAME)?,
        ];
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Ompss,
            format!("{}.{}", ImplementationKind::Ompss, self.binary),
            type_args,
        )?;
        Ok(())
    }

    fn prepare(&self, call: &mut Call, _function: &FunctionSignature) -> Result<(), TaskError> {
        inject_computing_nodes(call, &self.arguments);
        Ok(())
    }

    fn prepend_strings(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_filled_at_construction() {
        let ompss = Ompss::new(json!({"binary": "sleep"})).unwrap();
        assert_eq!(ompss.arguments().get(COMPUTING_NODES), Some(&json!(1)));
        assert_eq!(ompss.arguments().get(WORKING_DIR), Some(&json!("[unassigned]")));

        let mut builder = CoreElementBuilder::new();
        ompss
            .configure(&mut builder, &FunctionSignature::new("m", "g"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_signature(), Some("OMPSS.sleep"));
        assert_eq!(element.impl_type_args(), ["sleep", "[unassigned]", "false"]);
    }

    #[test]
    fn test_legacy_spellings() {
        let ompss = Ompss::new(json!({"binary": "b", "computingNodes": 3, "workingDir": "/w"}))
            .unwrap();
        assert_eq!(ompss.arguments().get(COMPUTING_NODES), Some(&json!(3)));
        assert_eq!(ompss.arguments().get(WORKING_DIR), Some(&json!("/w")));
        assert!(!ompss.arguments().contains(LEGACY_COMPUTING_NODES));
    }
}
