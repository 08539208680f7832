use crate::annotations::{
    BINARY, FLAGS, PARAMS, RUNNER, inject_computing_nodes, optional_string, required_string,
};
use crate::core::ArgValue;
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::call::Call;
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::{
    COMPUTING_NODES, FAIL_BY_EXIT_VALUE, LEGACY_COMPUTING_NODES, LEGACY_WORKING_DIR, WORKING_DIR,
    process_computing_nodes, resolve_alias, resolve_fail_by_exit_value, resolve_working_dir,
};

const PROCESSES_PER_NODE: &str = "processes_per_node";
const LEGACY_PROCESSES_PER_NODE: &str = "processesPerNode";
const SCALE_BY_CU: &str = "scale_by_cu";
const LEGACY_SCALE_BY_CU: &str = "scaleByCU";

const RULES: ArgumentRules = ArgumentRules::new(
    &[RUNNER],
    &[
        BINARY,
        PROCESSES_PER_NODE,
        FLAGS,
        SCALE_BY_CU,
        PARAMS,
        WORKING_DIR,
        COMPUTING_NODES,
        FAIL_BY_EXIT_VALUE,
    ],
    &[
        LEGACY_PROCESSES_PER_NODE,
        LEGACY_SCALE_BY_CU,
        LEGACY_WORKING_DIR,
        LEGACY_COMPUTING_NODES,
    ],
);

/// `@mpi`: the task runs through an MPI runner, either as an external binary
/// or as the decorated function itself when no binary is given.
#[derive(Debug, Clone)]
pub struct Mpi {
    arguments: DecoratorArguments,
    runner: String,
    binary: Option<String>,
}

impl Mpi {
    pub const NAME: &'static str = "@mpi";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        process_computing_nodes(&mut arguments, Self::NAME);
        resolve_working_dir(&mut arguments);
        resolve_fail_by_exit_value(&mut arguments, Self::NAME)?;
        resolve_alias(
            &mut arguments,
            PROCESSES_PER_NODE,
            LEGACY_PROCESSES_PER_NODE,
            Some(ArgValue::from(1)),
        );
        resolve_alias(
            &mut arguments,
            SCALE_BY_CU,
            LEGACY_SCALE_BY_CU,
            Some(ArgValue::from(false)),
        );
        let runner = required_string(&arguments, RUNNER, Self::NAME)?;
        let binary = match arguments.get(BINARY) {
            Some(_) => Some(required_string(&arguments, BINARY, Self::NAME)?),
            None => None,
        };
        Ok(Self {
            arguments,
            runner,
            binary,
        })
    }

    pub fn runner(&self) -> &str {
        &self.runner
    }

    fn type_args(&self) -> Result<Vec<String>, ConfigurationError> {
        Ok(vec![
            optional_string(&self.arguments, BINARY, Self::NAME)?,
            required_string(&self.arguments, WORKING_DIR, Self::NAME)?,
            self.runner.clone(),
            required_string(&self.arguments, PROCESSES_PER_NODE, Self::NAME)?,
            optional_string(&self.arguments, FLAGS, Self::NAME)?,
            required_string(&self.arguments, SCALE_BY_CU, Self::NAME)?,
            optional_string(&self.arguments, PARAMS, Self::NAME)?,
            required_string(&self.arguments, FAIL_BY_EXIT_VALUE, Self::NAME)?,
        ])
    }
}

impl Annotation for Mpi {
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
        let target = match &self.binary {
            Some(binary) => binary.clone(),
            None => function.qualified_name(),
        };
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Mpi,
            format!("{}.{}", ImplementationKind::Mpi, target),
            self.type_args()?,
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

    fn configure(mpi: &Mpi) -> std::sync::Arc<crate::core::element::CoreElement> {
        let mut builder = CoreElementBuilder::new();
        mpi.configure(&mut builder, &FunctionSignature::new("solver", "run"))
            .unwrap();
        builder.freeze()
    }

    #[test]
    fn test_mpi_binary() {
        let mpi = Mpi::new(json!({
            "runner": "mpirun",
            "binary": "hello.x",
            "processesPerNode": 4,
            "scaleByCU": true,
            "computing_nodes": 2,
        }))
        .unwrap();
        let element = configure(&mpi);
        assert_eq!(element.impl_signature(), Some("MPI.hello.x"));
        assert_eq!(
            element.impl_type_args(),
            [
                "hello.x",
                "[unassigned]",
                "mpirun",
                "4",
                "[unassigned]",
                "true",
                "[unassigned]",
                "false"
            ]
        );
    }

    #[test]
    fn test_mpi_runs_the_decorated_function() {
        let mpi = Mpi::new(json!({"runner": "srun"})).unwrap();
        let element = configure(&mpi);
        assert_eq!(element.impl_signature(), Some("MPI.solver.run"));
        assert_eq!(element.impl_type_args()[3], "1");
        assert_eq!(element.impl_type_args()[5], "false");
    }

    #[test]
    fn test_runner_mandatory() {
        assert!(matches!(
            Mpi::new(json!({"binary": "a.out"})),
            Err(ConfigurationError::MissingArgument { .. })
        ));
    }
}
