use crate::annotations::{FLAGS, inject_computing_nodes, optional_string, required_string};
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

const APP_NAME: &str = "app_name";
const LEGACY_APP_NAME: &str = "appName";
const RUNCOMPSS: &str = "runcompss";
const WORKER_IN_MASTER: &str = "worker_in_master";
const LEGACY_WORKER_IN_MASTER: &str = "workerInMaster";

const RULES: ArgumentRules = ArgumentRules::new(
    &[APP_NAME],
    &[
        RUNCOMPSS,
        FLAGS,
        WORKER_IN_MASTER,
        WORKING_DIR,
        COMPUTING_NODES,
        FAIL_BY_EXIT_VALUE,
    ],
    &[
        LEGACY_APP_NAME,
        LEGACY_WORKER_IN_MASTER,
        LEGACY_WORKING_DIR,
        LEGACY_COMPUTING_NODES,
    ],
);

/// `@compss`: the task is a nested COMPSs application.
#[derive(Debug, Clone)]
pub struct Compss {
    arguments: DecoratorArguments,
    app_name: String,
}

impl Compss {
    pub const NAME: &'static str = "@compss";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        resolve_alias(&mut arguments, APP_NAME, LEGACY_APP_NAME, None);
        resolve_alias(
            &mut arguments,
            WORKER_IN_MASTER,
            LEGACY_WORKER_IN_MASTER,
            Some(ArgValue::from("true")),
        );
        process_computing_nodes(&mut arguments, Self::NAME);
        resolve_working_dir(&mut arguments);
        resolve_fail_by_exit_value(&mut arguments, Self::NAME)?;
        let app_name = required_string(&arguments, APP_NAME, Self::NAME)?;
        Ok(Self {
            arguments,
            app_name,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }
}

impl Annotation for Compss {
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
            optional_string(&self.arguments, RUNCOMPSS, Self::NAME)?,
            optional_string(&self.arguments, FLAGS, Self::NAME)?,
            self.app_name.clone(),
            required_string(&self.arguments, WORKER_IN_MASTER, Self::NAME)?,
            required_string(&self.arguments, WORKING_DIR, Self::NAME)?,
            required_string(&self.arguments, FAIL_BY_EXIT_VALUE, Self::NAME)?,
        ];
        element.set_implementation(
            Self::NAME,
            ImplementationKind::Compss,
            format!("{}.{}", ImplementationKind::Compss, self.app_name),
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
    fn test_legacy_app_name_satisfies_mandatory() {
        let compss = Compss::new(json!({"appName": "/apps/kmeans.py", "workerInMaster": false}))
            .unwrap();
        assert_eq!(compss.app_name(), "/apps/kmeans.py");

        let mut builder = CoreElementBuilder::new();
        compss
            .configure(&mut builder, &FunctionSignature::new("m", "nested"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_kind(), Some(ImplementationKind::Compss));
        assert_eq!(element.impl_signature(), Some("COMPSs./apps/kmeans.py"));
        assert_eq!(
            element.impl_type_args(),
            [
                "[unassigned]",
                "[unassigned]",
                "/apps/kmeans.py",
                "false",
                "[unassigned]",
                "false"
            ]
        );
    }
}
