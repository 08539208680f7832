use thiserror::Error;

/// Decoration-time failures: bad annotation arguments or a conflicting stack.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{decorator}: missing mandatory argument `{argument}`")]
    MissingArgument {
        decorator: String,
        argument: String,
    },

    #[error("{decorator}: unsupported argument `{argument}`")]
    UnsupportedArgument {
        decorator: String,
        argument: String,
    },

    #[error("{decorator}: invalid value for `{argument}`: expected {expected}, found {found}")]
    InvalidArgumentType {
        decorator: String,
        argument: String,
        expected: String,
        found: String,
    },

    #[error(
        "{attempted} cannot set the implementation of this task: it is already owned by {owner}"
    )]
    PrimaryConflict { owner: String, attempted: String },

    #[error("@task must be the innermost annotation of {0}")]
    TaskNotInnermost(String),

    #[error("software task type `{0}` is not supported")]
    UnsupportedSoftwareType(String),

    #[error("invalid software config file {path}: {reason}")]
    InvalidConfigFile { path: String, reason: String },
}

/// Call-time failures of the data transformation engine, raised before any
/// asynchronous unit is submitted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformationError {
    #[error("parameter `{parameter}` is not declared by `{function}`")]
    UnknownParameter { function: String, parameter: String },

    #[error("transform `{0}` is not registered")]
    NotCallable(String),

    #[error("parameter `{0}` is targeted by more than one transformation")]
    DuplicateTarget(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{decorator} was invoked outside of a managed run")]
    OutOfScope { decorator: String },

    #[error(transparent)]
    Transformation(#[from] TransformationError),

    #[error("registration rejected: {0}")]
    Registration(String),

    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("hook `{binary}` failed: {reason}")]
    Hook { binary: String, reason: String },

    #[error("asynchronous unit {0} was cancelled")]
    Cancelled(String),
}

impl TaskError {
    /// Convenience constructor for failures raised by task bodies and transforms.
    pub fn execution(message: impl Into<String>) -> Self {
        TaskError::Execution(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, TaskError::Configuration(_))
    }

    pub fn is_out_of_scope(&self) -> bool {
        matches!(self, TaskError::OutOfScope { .. })
    }

    pub fn is_transformation(&self) -> bool {
        matches!(self, TaskError::Transformation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_converts_into_task_error() {
        let err: TaskError = ConfigurationError::MissingArgument {
            decorator: "@prolog".to_string(),
            argument: "binary".to_string(),
        }
        .into();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "@prolog: missing mandatory argument `binary`");
    }

    #[test]
    fn test_conflict_message_names_both_annotations() {
        let err = ConfigurationError::PrimaryConflict {
            owner: "@binary".to_string(),
            attempted: "@ompss".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("@binary"));
        assert!(msg.contains("@ompss"));
    }
}
