use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::Annotation;
use crate::core::element::CoreElementBuilder;
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;

/// `@constraint`: resource requirements. Accepts any constraint name.
#[derive(Debug, Clone)]
pub struct Constraint {
    arguments: DecoratorArguments,
}

impl Constraint {
    pub const NAME: &'static str = "@constraint";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let arguments = arguments.into();
        check_arguments(&ArgumentRules::open(), &arguments, Self::NAME)?;
        Ok(Self { arguments })
    }
}

impl Annotation for Constraint {
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
        element.add_constraints(
            self.arguments
                .keyword()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constraints_merge() {
        let mut builder = CoreElementBuilder::new();
        let sig = FunctionSignature::new("m", "f");
        Constraint::new(json!({"computing_units": 2}))
            .unwrap()
            .configure(&mut builder, &sig)
            .unwrap();
        Constraint::new(json!({"memory_size": 8, "computing_units": 4}))
            .unwrap()
            .configure(&mut builder, &sig)
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.constraint("computing_units"), Some(&json!(4)));
        assert_eq!(element.constraint("memory_size"), Some(&json!(8)));
        assert!(element.primary_owner().is_none());
    }
}
