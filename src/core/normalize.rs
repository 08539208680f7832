//! Resolution of legacy spellings and coercion of ambiguous argument types.
//!
//! Every function here only touches the argument bag it is given and leaves a
//! single canonical entry behind.

use crate::core::ArgValue;
use crate::core::arguments::{DecoratorArguments, type_name};
use crate::core::error::ConfigurationError;

pub const UNASSIGNED: &str = "[unassigned]";

pub const WORKING_DIR: &str = "working_dir";
pub const LEGACY_WORKING_DIR: &str = "workingDir";
pub const FAIL_BY_EXIT_VALUE: &str = "fail_by_exit_value";
pub const COMPUTING_NODES: &str = "computing_nodes";
pub const LEGACY_COMPUTING_NODES: &str = "computingNodes";

/// Moves `legacy` onto `canonical` when only the legacy spelling is present,
/// and fills in `default` when neither is. Returns the canonical value.
pub fn resolve_alias(
    arguments: &mut DecoratorArguments,
    canonical: &str,
    legacy: &str,
    default: Option<ArgValue>,
) -> Option<ArgValue> {
    if !arguments.contains(canonical) {
        if let Some(value) = arguments.remove(legacy) {
            arguments.insert(canonical, value);
        } else if let Some(value) = default {
            arguments.insert(canonical, value);
        }
    } else if arguments.contains(legacy) {
        log::warn!(
            "Both `{}` and `{}` were given, `{}` wins",
            canonical,
            legacy,
            canonical
        );
        arguments.remove(legacy);
    }
    arguments.get(canonical).cloned()
}

pub fn resolve_working_dir(arguments: &mut DecoratorArguments) {
    resolve_alias(
        arguments,
        WORKING_DIR,
        LEGACY_WORKING_DIR,
        Some(ArgValue::from(UNASSIGNED)),
    );
}

/// Coerces `fail_by_exit_value` to its string form: booleans become
/// `"true"`/`"false"`, integers their decimal spelling, strings (usually an
/// environment variable name) pass through. Anything else is rejected.
pub fn resolve_fail_by_exit_value(
    arguments: &mut DecoratorArguments,
    decorator: &str,
) -> Result<(), ConfigurationError> {
    let coerced = match arguments.get(FAIL_BY_EXIT_VALUE) {
        None => "false".to_string(),
        Some(ArgValue::Bool(flag)) => flag.to_string(),
        Some(ArgValue::String(s)) => s.clone(),
        Some(ArgValue::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(other) => {
            return Err(ConfigurationError::InvalidArgumentType {
                decorator: decorator.to_string(),
                argument: FAIL_BY_EXIT_VALUE.to_string(),
                expected: "a boolean, an integer or an environment variable name".to_string(),
                found: type_name(other).to_string(),
            });
        }
    };
    arguments.insert(FAIL_BY_EXIT_VALUE, coerced);
    Ok(())
}

/// Makes sure `computing_nodes` exists. The value itself is resolved later by
/// the scheduler, so it is passed through untouched.
pub fn process_computing_nodes(arguments: &mut DecoratorArguments, decorator: &str) {
    let nodes = resolve_alias(
        arguments,
        COMPUTING_NODES,
        LEGACY_COMPUTING_NODES,
        Some(ArgValue::from(1)),
    );
    if let Some(nodes) = nodes {
        log::debug!("This {} task will have {} computing nodes.", decorator, nodes);
    }
}
