use crate::annotations::inject_computing_nodes;
use crate::core::arguments::{ArgumentRules, DecoratorArguments, check_arguments};
use crate::core::call::Call;
use crate::core::decorator::Annotation;
use crate::core::element::{CoreElementBuilder, ImplementationKind};
use crate::core::error::{ConfigurationError, TaskError};
use crate::core::function::FunctionSignature;
use crate::core::normalize::{COMPUTING_NODES, LEGACY_COMPUTING_NODES, process_computing_nodes};

const RULES: ArgumentRules =
    ArgumentRules::new(&[], &[COMPUTING_NODES], &[LEGACY_COMPUTING_NODES]);

/// `@multinode`: the decorated function itself runs across several nodes.
#[derive(Debug, Clone)]
pub struct MultiNode {
    arguments: DecoratorArguments,
}

impl MultiNode {
    pub const NAME: &'static str = "@multinode";

    pub fn new(arguments: impl Into<DecoratorArguments>) -> Result<Self, ConfigurationError> {
        let mut arguments = arguments.into();
        check_arguments(&RULES, &arguments, Self::NAME)?;
        process_computing_nodes(&mut arguments, Self::NAME);
        Ok(Self { arguments })
    }
}

impl Annotation for MultiNode {
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
            ImplementationKind::MultiNode,
            function.qualified_name(),
            Vec::new(),
        )?;
        Ok(())
    }

    fn prepare(&self, call: &mut Call, _function: &FunctionSignature) -> Result<(), TaskError> {
        inject_computing_nodes(call, &self.arguments);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multinode_descriptor() {
        let multinode = MultiNode::new(json!({"computingNodes": 4})).unwrap();
        assert_eq!(multinode.arguments().get(COMPUTING_NODES), Some(&json!(4)));
        let mut builder = CoreElementBuilder::new();
        multinode
            .configure(&mut builder, &FunctionSignature::new("sim", "step"))
            .unwrap();
        let element = builder.freeze();
        assert_eq!(element.impl_kind(), Some(ImplementationKind::MultiNode));
        assert_eq!(element.impl_signature(), Some("sim.step"));
        assert!(element.impl_type_args().is_empty());
        assert!(multinode.prepend_strings());
    }
}
