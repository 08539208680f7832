//! The annotation types.
//!
//! Each one validates its decoration-time arguments on construction and
//! contributes its own fields to the per-call task descriptor. Exactly one
//! annotation per stack may own the implementation (kind, signature and
//! type-arguments); the others only add hooks, constraints or per-call
//! behaviour.

pub mod binary;
pub mod compss;
pub mod constraint;
pub mod container;
pub mod data_transformation;
pub mod decaf;
pub mod epilog;
pub mod implement;
pub mod mpi;
pub mod multinode;
pub mod ompss;
pub mod prolog;
pub mod software;
pub mod task;

pub use binary::Binary;
pub use compss::Compss;
pub use constraint::Constraint;
pub use container::Container;
pub use data_transformation::DataTransformation;
pub use decaf::Decaf;
pub use epilog::Epilog;
pub use implement::Implement;
pub use mpi::Mpi;
pub use multinode::MultiNode;
pub use ompss::Ompss;
pub use prolog::Prolog;
pub use software::Software;
pub use task::Task;

use crate::core::arguments::{DecoratorArguments, type_name, value_to_string};
use crate::core::call::Call;
use crate::core::error::ConfigurationError;
use crate::core::normalize::{COMPUTING_NODES, UNASSIGNED};

pub const BINARY: &str = "binary";
pub const PARAMS: &str = "params";
pub const RUNNER: &str = "runner";
pub const FLAGS: &str = "flags";

/// Reads a mandatory argument as a string.
pub(crate) fn required_string(
    arguments: &DecoratorArguments,
    name: &str,
    decorator: &str,
) -> Result<String, ConfigurationError> {
    match arguments.get(name) {
        None => Err(ConfigurationError::MissingArgument {
            decorator: decorator.to_string(),
            argument: name.to_string(),
        }),
        Some(value) => value_to_string(value).ok_or_else(|| {
            ConfigurationError::InvalidArgumentType {
                decorator: decorator.to_string(),
                argument: name.to_string(),
                expected: "a string".to_string(),
                found: type_name(value).to_string(),
            }
        }),
    }
}

/// Reads an optional string argument, `[unassigned]` when absent.
pub(crate) fn optional_string(
    arguments: &DecoratorArguments,
    name: &str,
    decorator: &str,
) -> Result<String, ConfigurationError> {
    if arguments.contains(name) {
        required_string(arguments, name, decorator)
    } else {
        Ok(UNASSIGNED.to_string())
    }
}

/// Copies the annotation's `computing_nodes` into the call's keyword
/// arguments, where `@task` picks it up.
pub(crate) fn inject_computing_nodes(call: &mut Call, arguments: &DecoratorArguments) {
    if let Some(nodes) = arguments.get(COMPUTING_NODES) {
        call.arguments_mut()
            .set_keyword(COMPUTING_NODES, nodes.clone());
    }
}

pub(crate) fn unassigned() -> String {
    UNASSIGNED.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_readers() {
        let args = DecoratorArguments::from(json!({"binary": "ls", "count": 2, "list": [1]}));
        assert_eq!(required_string(&args, "binary", "@t").unwrap(), "ls");
        assert_eq!(required_string(&args, "count", "@t").unwrap(), "2");
        assert!(matches!(
            required_string(&args, "list", "@t"),
            Err(ConfigurationError::InvalidArgumentType { .. })
        ));
        assert!(matches!(
            required_string(&args, "missing", "@t"),
            Err(ConfigurationError::MissingArgument { .. })
        ));
        assert_eq!(optional_string(&args, "params", "@t").unwrap(), UNASSIGNED);
    }
}
