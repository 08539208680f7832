use crate::annotations::{RUNNER, inject_computing_nodes, optional_string, required_string};
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

const DF_SCRIPT: &str = "df_script";
const LEGACY_DF_SCRIPT: &str = "dfScript";
const DF_EXECUTOR: &str = "df_executor";
const LEGACY_DF_EXECUTOR: &str = "dfExecutor";
const DF_LIB: &str = "df_lib";
const LEGACY_DF_LIB: &str = "dfLib";

const RULES: ArgumentRules = ArgumentRules::new(
    &[DF_SCRIPT],
    &[
        DF_EXECUTOR,
        DF_LIB,
        RUNNER,
        WORKING_DIR,
        COMPUTING_NODES,
        FAIL_BY_EXIT_VALUE,
    ],
    &[
        LEGACY_DF_SCRIPT,
        LEGACY_DF_EXECUTOR,
        LEGACY_DF_LIB,
        LEGACY_WORKING_DIR,
        LEGACY_COMPUTING_NODES,
    ],
);

/// `@decaf`: the task is a Decaf dataflow.
#[derive(Debug, Clone)]
pub struct Decaf {
    arguments: DecoratorArguments,
    df_script: String,
}

impl Decaf {
    pub const NAME: &'static str = "@decaf";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        resolve_alias(&mut arguments, DF_SCRIPT, LEGACY_DF_SCRIPT, None);
        resolve_alias(&mut arguments, DF_EXECUTOR, LEGACY_DF_EXECUTOR, None);
        resolve_alias(&mut arguments, DF_LIB, LEGACY_DF_LIB, None);
        if !arguments.contains(RUNNER) {
            arguments.insert(RUNNER, ArgValue::from("mpirun"));
        }
        process_computing_nodes(&mut arguments, Self::NAME);
        resolve_working_dir(&mut arguments);
        resolve_fail_by_exit_value(&mut arguments, Self::NAME)?;
        let df_script = required_string(&arguments, DF_SCRIPT, Self::NAME)?;
        Ok(Self {
            arguments,
            df_script,
        })
    }
}

impl Annotation for Decaf {
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
            self.df_script.clone(),
            optional_string(&self.arguments, DF_EXECUTOR, Self::NAME)?,
            optional_string(&self.arguments, DF_LIB, Self::NAME)?,
            required_string(&self.arguments, WORKING_DIR, Self::NAME)?,
            required_string(&self.arguments, RUNNER, Self::NAME)?,
            required_string(&self.arguments, FAIL_BY_EXIT_VALUE, Self::NAME)?,
        ];
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Decaf,
            format!("{}.{}", ImplementationKind::Decaf, self.df_script),
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
    fn test_decaf_descriptor() {
        let decaf = Decaf::new(json!({"df_script": "flow.py", "dfLib": "/opt/decaf"})).unwrap();
        let mut builder = CoreElementBuilder::new();
        decaf
            .configure(&mut builder, &FunctionSignature::new("m", "f"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_signature(), Some("DECAF.flow.py"));
        assert_eq!(
            element.impl_type_args(),
            [
                "flow.py",
                "[unassigned]",
                "/opt/decaf",
                "[unassigned]",
                "mpirun",
                "false"
            ]
        );
    }
}
