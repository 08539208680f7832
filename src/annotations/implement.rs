use crate::annotations::required_string;
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::resolve_alias;

const SOURCE_CLASS: &str = "source_class";
const LEGACY_SOURCE_CLASS: &str = "sourceClass";
const METHOD: &str = "method";

const RULES: ArgumentRules =
    ArgumentRules::new(&[SOURCE_CLASS, METHOD], &[], &[LEGACY_SOURCE_CLASS]);

/// `@implement`: the decorated function is an alternative implementation of
/// `source_class.method`.
#[derive(Debug, Clone)]
pub struct Implement {
    arguments: DecoratorArguments,
    source_class: String,
    method: String,
}

impl Implement {
    pub const NAME: &'static str = "@implement";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        resolve_alias(&mut arguments, SOURCE_CLASS, LEGACY_SOURCE_CLASS, None);
        let source_class = required_string(&arguments, SOURCE_CLASS, Self::NAME)?;
        let method = required_string(&arguments, METHOD, Self::NAME)?;
        Ok(Self {
            arguments,
            source_class,
            method,
        })
    }
}

impl Annotation for Implement {
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
            ImplementationKind::Method,
            format!("{}.{}", self.source_class, self.method),
            vec![self.source_class.clone(), self.method.clone()],
        )?;
        Ok(())
    }
}
