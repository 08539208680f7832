use crate::annotations::{BINARY, PARAMS, optional_string, required_string};
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, Hook};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::{FAIL_BY_EXIT_VALUE, resolve_fail_by_exit_value};

const HOOK_RULES: ArgumentRules =
    ArgumentRules::new(&[BINARY], &[PARAMS, FAIL_BY_EXIT_VALUE], &[]);

/// Validates and normalizes hook arguments, returning them with the hook.
pub(crate) fn hook_from(
    arguments: impl Into<DecoratorArguments>,
    decorator: &str,
) -> Result<(DecoratorArguments, Hook), ConfigurationError> {
    let mut arguments = arguments.into();
    check_arguments(&HOOK_RULES, &arguments, decorator)?;
    resolve_fail_by_exit_value(&mut arguments, decorator)?;
    let hook = Hook::new(
        required_string(&arguments, BINARY, decorator)?,
        optional_string(&arguments, PARAMS, decorator)?,
        required_string(&arguments, FAIL_BY_EXIT_VALUE, decorator)?,
    );
    Ok((arguments, hook))
}

/// `@prolog`: a binary run on the worker before the task.
#[derive(Debug, Clone)]
pub struct Prolog {
    arguments: DecoratorArguments,
    hook: Hook,
}

impl Prolog {
    pub const NAME: &'static str = "@prolog";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let (arguments, hook) = hook_from(arguments, Self::NAME)?;
        Ok(Self { arguments, hook })
    }

    pub fn hook(&self) -> &Hook {
        &self.hook
    }
}

impl Annotation for Prolog {
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
        element.set_prolog(self.hook.clone());
        Ok(())
    }
}
