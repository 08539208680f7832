use crate::annotations::{BINARY, PARAMS, optional_string, required_string};
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::{
    FAIL_BY_EXIT_VALUE, LEGACY_WORKING_DIR, WORKING_DIR, resolve_fail_by_exit_value,
    resolve_working_dir,
};

const RULES: ArgumentRules = ArgumentRules::new(
    &[BINARY],
    &[WORKING_DIR, PARAMS, FAIL_BY_EXIT_VALUE],
    &[LEGACY_WORKING_DIR],
);

/// `@binary`: the task is an external executable.
#[derive(Debug, Clone)]
pub struct Binary {
    arguments: DecoratorArguments,
    binary: String,
}

impl Binary {
    pub const NAME: &'static str = "@binary";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        resolve_working_dir(&mut arguments);
        resolve_fail_by_exit_value(&mut arguments, Self::NAME)?;
        let binary = required_string(&arguments, BINARY, Self::NAME)?;
        Ok(Self { arguments, binary })
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn type_args(&self) -> Result<Vec<String>, ConfigurationError> {
        Ok(vec![
            self.binary.clone(),
            required_string(&self.arguments, WORKING_DIR, Self::NAME)?,
            optional_string(&self.arguments, PARAMS, Self::NAME)?,
            required_string(&self.arguments, FAIL_BY_EXIT_VALUE, Self::NAME)?,
        ])
    }
}

impl Annotation for Binary {
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
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Binary,
            format!("{}.{}", ImplementationKind::Binary, self.binary),
            self.type_args()?,
        )?;
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
    fn test_binary_descriptor() {
        let binary = Binary::new(json!({
            "binary": "grep",
            "workingDir": "/data",
            "params": "-c {{x}}",
        }))
        .unwrap();
        let mut builder = CoreElementBuilder::new();
        binary
            .configure(&mut builder, &FunctionSignature::new("m", "count"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_kind(), Some(ImplementationKind::Binary));
        assert_eq!(element.impl_signature(), Some("BINARY.grep"));
        assert_eq!(
            element.impl_type_args(),
            ["grep", "/data", "-c {{x}}", "false"]
        );
        assert!(!binary.prepend_strings());
    }
}
