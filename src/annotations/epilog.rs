use crate::annotations::prolog::hook_from;
use crate::core::arguments::DecoratorArguments;
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, Hook};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;

/// `@epilog`: a binary run on the worker after the task.
#[derive(Debug, Clone)]
pub struct Epilog {
    arguments: DecoratorArguments,
    hook: Hook,
}

impl Epilog {
    pub const NAME: &'static str = "@epilog";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let (arguments, hook) = hook_from(arguments, Self::NAME)?;
        Ok(Self { arguments, hook })
    }

    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

impl Annotation for Epilog {
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
        element.set_epilog(self.hook.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epilog_writes_its_own_hook() {
        let epilog = Epilog::new(json!({
            "binary": "rm",
            "params": "-f out",
            "fail_by_exit_value": 1,
        }))
        .unwrap();
        let mut builder = CoreElementBuilder::new();
        epilog
            .configure(&mut builder, &FunctionSignature::new("m", "f"))
            .unwrap();
        let element = builder.freeze();
        assert!(element.prolog().is_none());
        assert!(element.epilog().unwrap() == &("rm", "-f out", "1"));
    }

    #[test]
    fn test_unknown_argument_rejected() {
        let err = Epilog::new(json!({"binary": "rm", "workingDir": "/"})).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedArgument { .. }));
    }
}
