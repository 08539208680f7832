use crate::annotations::{required_string, unassigned};
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::UNASSIGNED;

const ENGINE: &str = "engine";
const IMAGE: &str = "image";

const RULES: ArgumentRules = ArgumentRules::new(&[ENGINE, IMAGE], &[], &[]);

/// Position of the internal type inside container type-arguments.
pub const INTERNAL_TYPE: usize = 2;
/// Position of the internal function (`module&name`).
pub const INTERNAL_FUNCTION: usize = 4;
pub const CET_PYTHON: &str = "CET_PYTHON";

/// `@container`: the task runs inside a container image. The internal
/// implementation is completed by `@task`.
#[derive(Debug, Clone)]
pub struct Container {
    arguments: DecoratorArguments,
    engine: String,
    image: String,
}

impl Container {
    pub const NAME: &'static str = "@container";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        let engine = required_string(&arguments, ENGINE, Self::NAME)?;
        let image = required_string(&arguments, IMAGE, Self::NAME)?;
        Ok(Self {
            arguments,
            engine,
            image,
        })
    }
}

/// `[engine, image, internal_type, internal_binary, internal_function,
/// working_dir, fail_by_exit_value]`, with everything past the image unset.
fn container_type_args(engine: &str, image: &str) -> Vec<String> {
    let mut args = vec![engine.to_string(), image.to_string()];
    args.extend(std::iter::repeat_with(unassigned).take(5));
    args
}

/// Fills in a container descriptor left incomplete: the container runs the
/// decorated function itself.
pub(crate) fn complete_container_args(
    type_args: &[String],
    function: &FunctionSignature,
) -> Option<Vec<String>> {
    if type_args.len() <= INTERNAL_FUNCTION
        || type_args[INTERNAL_TYPE] != UNASSIGNED
    {
        return None;
    }
    let mut completed = type_args.to_vec();
    completed[INTERNAL_TYPE] = CET_PYTHON.to_string();
    completed[INTERNAL_FUNCTION] = format!("{}&{}", function.module(), function.name());
    Some(completed)
}

impl Annotation for Container {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn arguments(&self) -> &DecoratorArguments {
        &self.arguments
    }

    fn configure(
        &self,
        element: &mut CoreElementBuilder,
        function: &FunctionSignature,
    ) -> Result<(), TaskError> {
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Container,
            format!("{}.{}", ImplementationKind::Container, function.qualified_name()),
            container_type_args(&self.engine, &self.image),
        )?;
        Ok(())
    }

    fn prepend_strings(&self) -> bool {
        false
    }
}
