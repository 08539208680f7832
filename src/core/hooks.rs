//! Running prolog and epilog binaries.

use crate::core::element::Hook;
use crate::core::error::TaskError;
use crate::core::normalize::UNASSIGNED;
use tokio::process::Command;

/// What a non-zero exit status of a hook means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fail,
    Ignore,
}

impl FailurePolicy {
    /// Interprets a normalized `fail_by_exit_value`.
    ///
    /// `"true"` and `"false"` are literal. A decimal number fails on non-zero.
    /// Any other string names an environment variable holding the policy,
    /// looked up through `lookup`; an unset variable means `Ignore`.
    pub fn resolve<F>(fail_by_exit_value: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::literal(fail_by_exit_value) {
            Some(policy) => policy,
            None => lookup(fail_by_exit_value)
                .and_then(|value| Self::literal(value.trim()))
                .unwrap_or(FailurePolicy::Ignore),
        }
    }

    pub fn from_env(fail_by_exit_value: &str) -> Self {
        Self::resolve(fail_by_exit_value, |name| std::env::var(name).ok())
    }

    fn literal(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "true" => Some(FailurePolicy::Fail),
            "false" => Some(FailurePolicy::Ignore),
            other => other.parse::<i64>().ok().map(|n| {
                if n != 0 {
                    FailurePolicy::Fail
                } else {
                    FailurePolicy::Ignore
                }
            }),
        }
    }
}

/// Splits `params` on whitespace. Quotes are not interpreted, so a single
/// argument cannot contain spaces.
fn hook_arguments(params: &str) -> Vec<String> {
    if params == UNASSIGNED {
        return Vec::new();
    }
    params.split_whitespace().map(str::to_string).collect()
}

/// Runs `hook` to completion.
pub async fn run_hook(hook: &Hook) -> Result<(), TaskError> {
    let policy = FailurePolicy::from_env(&hook.fail_by_exit_value);
    let binary = hook.binary.clone();
    let args = hook_arguments(&hook.params);
    log::debug!("Running hook `{}` with {:?}", binary, args);

    let status = Command::new(&binary)
        .args(&args)
        .status()
        .await
        .map_err(|e| TaskError::Hook {
            binary: binary.clone(),
            reason: e.to_string(),
        })?;

    if status.success() {
        return Ok(());
    }
    match policy {
        FailurePolicy::Fail => {
            log::error!("Hook `{}` exited with {}", binary, status);
            Err(TaskError::Hook {
                binary,
                reason: format!("exited with {status}"),
            })
        }
        FailurePolicy::Ignore => {
            log::warn!("Hook `{}` exited with {}, ignoring it.", binary, status);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_literals() {
        let no_env = |_: &str| None;
        assert_eq!(FailurePolicy::resolve("true", no_env), FailurePolicy::Fail);
        assert_eq!(FailurePolicy::resolve("false", no_env), FailurePolicy::Ignore);
        assert_eq!(FailurePolicy::resolve("7", no_env), FailurePolicy::Fail);
        assert_eq!(FailurePolicy::resolve("0", no_env), FailurePolicy::Ignore);
    }

    #[test]
    fn test_policy_from_environment_variable() {
        let env = |name: &str| (name == "MY_ENV").then(|| "True".to_string());
        assert_eq!(FailurePolicy::resolve("MY_ENV", env), FailurePolicy::Fail);
        assert_eq!(FailurePolicy::resolve("OTHER", env), FailurePolicy::Ignore);
    }

    #[test]
    fn test_unassigned_params_are_empty() {
        assert!(hook_arguments(UNASSIGNED).is_empty());
        assert_eq!(hook_arguments("-n  hi"), vec!["-n", "hi"]);
        assert_eq!(hook_arguments("'a b'"), vec!["'a", "b'"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_hook_respects_policy() {
        let strict = Hook::new("false", UNASSIGNED, "true");
        let err = run_hook(&strict).await.unwrap_err();
        assert!(matches!(err, TaskError::Hook { binary, .. } if binary == "false"));

        let lenient = Hook::new("false", UNASSIGNED, "false");
        assert!(run_hook(&lenient).await.is_ok());
        assert!(run_hook(&Hook::new("true", UNASSIGNED, "true")).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_hook_error() {
        let hook = Hook::new("taskweave-no-such-binary", UNASSIGNED, "false");
        assert!(matches!(run_hook(&hook).await, Err(TaskError::Hook { .. })));
    }
}
