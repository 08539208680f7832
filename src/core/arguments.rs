use crate::core::ArgValue;
use crate::core::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::HashMap;

/// The arguments of one call of an annotated function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    positional: Vec<ArgValue>,
    keyword: HashMap<String, ArgValue>,
}

/// Addresses one argument of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgSlot {
    Positional(usize),
    Keyword(String),
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ArgValue>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: HashMap::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn positional_values(&self) -> &[ArgValue] {
        &self.positional
    }

    pub fn keyword_values(&self) -> &HashMap<String, ArgValue> {
        &self.keyword
    }

    pub fn get_positional(&self, index: usize) -> Option<&ArgValue> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&ArgValue> {
        self.keyword.get(name)
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword.contains_key(name)
    }

    pub fn set_keyword(&mut self, name: impl Into<String>, value: ArgValue) -> Option<ArgValue> {
        self.keyword.insert(name.into(), value)
    }

    pub fn get(&self, slot: &ArgSlot) -> Option<&ArgValue> {
        match slot {
            ArgSlot::Positional(index) => self.positional.get(*index),
            ArgSlot::Keyword(name) => self.keyword.get(name),
        }
    }

    /// Writes `value` into `slot`. Positional slots past the end are padded with nulls.
    pub fn set(&mut self, slot: &ArgSlot, value: ArgValue) {
        match slot {
            ArgSlot::Positional(index) => {
                if *index >= self.positional.len() {
                    self.positional.resize(*index + 1, ArgValue::Null);
                }
                self.positional[*index] = value;
            }
            ArgSlot::Keyword(name) => {
                self.keyword.insert(name.clone(), value);
            }
        }
    }

    /// The receiver of a method-like call: the first positional argument, when
    /// it is an object.
    pub fn receiver(&self) -> Option<&Map<String, ArgValue>> {
        self.positional.first().and_then(ArgValue::as_object)
    }
}

/// The arguments an annotation was declared with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoratorArguments {
    positional: Vec<ArgValue>,
    keyword: HashMap<String, ArgValue>,
}

impl DecoratorArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn with_positional(mut self, value: impl Into<ArgValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn positional(&self) -> &[ArgValue] {
        &self.positional
    }

    pub fn keyword(&self) -> &HashMap<String, ArgValue> {
        &self.keyword
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keyword.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.keyword.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keyword.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        self.keyword.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<ArgValue> {
        self.keyword.remove(name)
    }

    /// Reads a string-valued argument. Numbers and booleans are rendered with
    /// their JSON spelling.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.keyword.get(name).and_then(value_to_string)
    }
}

impl From<Map<String, ArgValue>> for DecoratorArguments {
    fn from(map: Map<String, ArgValue>) -> Self {
        Self {
            positional: Vec::new(),
            keyword: map.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, ArgValue>> for DecoratorArguments {
    fn from(keyword: HashMap<String, ArgValue>) -> Self {
        Self {
            positional: Vec::new(),
            keyword,
        }
    }
}

/// Objects become keyword arguments, arrays positional ones, `null` nothing.
impl From<ArgValue> for DecoratorArguments {
    fn from(value: ArgValue) -> Self {
        match value {
            ArgValue::Object(map) => map.into(),
            ArgValue::Array(items) => Self {
                positional: items,
                keyword: HashMap::new(),
            },
            ArgValue::Null => Self::default(),
            other => Self {
                positional: vec![other],
                keyword: HashMap::new(),
            },
        }
    }
}

pub(crate) fn value_to_string(value: &ArgValue) -> Option<String> {
    match value {
        ArgValue::String(s) => Some(s.clone()),
        ArgValue::Number(n) => Some(n.to_string()),
        ArgValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Short JSON type name used in error messages.
pub(crate) fn type_name(value: &ArgValue) -> &'static str {
    match value {
        ArgValue::Null => "null",
        ArgValue::Bool(_) => "boolean",
        ArgValue::Number(n) if n.is_f64() => "float",
        ArgValue::Number(_) => "integer",
        ArgValue::String(_) => "string",
        ArgValue::Array(_) => "array",
        ArgValue::Object(_) => "object",
    }
}

/// The argument names an annotation type accepts.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentRules {
    pub mandatory: &'static [&'static str],
    pub supported: &'static [&'static str],
    pub deprecated: &'static [&'static str],
    /// Accept any name (e.g. `@constraint`).
    pub open: bool,
}

impl ArgumentRules {
    pub const fn new(
        mandatory: &'static [&'static str],
        supported: &'static [&'static str],
        deprecated: &'static [&'static str],
    ) -> Self {
        Self {
            mandatory,
            supported,
            deprecated,
            open: false,
        }
    }

    pub const fn open() -> Self {
        Self {
            mandatory: &[],
            supported: &[],
            deprecated: &[],
            open: true,
        }
    }

    fn accepts(&self, name: &str) -> bool {
        self.open
            || self.mandatory.contains(&name)
            || self.supported.contains(&name)
            || self.deprecated.contains(&name)
    }
}

/// `working_dir` -> `workingDir`
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Validates `arguments` against `rules`.
///
/// A mandatory name is also satisfied by its camelCase spelling when that
/// spelling is declared deprecated. Deprecated names are accepted with a
/// warning.
pub fn check_arguments(
    rules: &ArgumentRules,
    arguments: &DecoratorArguments,
    decorator: &str,
) -> Result<(), ConfigurationError> {
    for &mandatory in rules.mandatory {
        let legacy = to_camel_case(mandatory);
        let satisfied = arguments.contains(mandatory)
            || (rules.deprecated.contains(&legacy.as_str()) && arguments.contains(&legacy));
        if !satisfied {
            return Err(ConfigurationError::MissingArgument {
                decorator: decorator.to_string(),
                argument: mandatory.to_string(),
            });
        }
    }

    let mut names: Vec<&str> = arguments.names().collect();
    names.sort_unstable();
    for name in names {
        if !rules.accepts(name) {
            return Err(ConfigurationError::UnsupportedArgument {
                decorator: decorator.to_string(),
                argument: name.to_string(),
            });
        }
        if rules.deprecated.contains(&name) {
            log::warn!(
                "Detected deprecated argument `{}` in {}. It will be normalized, please update it.",
                name,
                decorator
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RULES: ArgumentRules = ArgumentRules::new(
        &["binary", "working_dir"],
        &["params"],
        &["workingDir"],
    );

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("working_dir"), "workingDir");
        assert_eq!(to_camel_case("fail_by_exit_value"), "failByExitValue");
        assert_eq!(to_camel_case("binary"), "binary");
    }

    #[test]
    fn test_missing_mandatory_argument() {
        let args = DecoratorArguments::from(json!({"working_dir": "/tmp"}));
        let err = check_arguments(&RULES, &args, "@test").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingArgument {
                decorator: "@test".to_string(),
                argument: "binary".to_string(),
            }
        );
    }

    #[test]
    fn test_deprecated_spelling_satisfies_mandatory() {
        let args = DecoratorArguments::from(json!({"binary": "ls", "workingDir": "/tmp"}));
        assert!(check_arguments(&RULES, &args, "@test").is_ok());
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let args =
            DecoratorArguments::from(json!({"binary": "ls", "working_dir": "/", "bogus": 1}));
        let err = check_arguments(&RULES, &args, "@test").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnsupportedArgument { argument, .. } if argument == "bogus"
        ));
    }

    #[test]
    fn test_open_rules_accept_anything() {
        let args = DecoratorArguments::from(json!({"computing_units": 4, "memory_size": 2}));
        assert!(check_arguments(&ArgumentRules::open(), &args, "@constraint").is_ok());
    }

    #[test]
    fn test_arguments_slots() {
        let mut args = Arguments::positional([json!({"name": "obj"}), json!(1)]).kwarg("y", 2);
        assert_eq!(args.receiver().and_then(|r| r.get("name")), Some(&json!("obj")));
        args.set(&ArgSlot::Positional(3), json!("late"));
        assert_eq!(args.positional_values().len(), 4);
        assert_eq!(args.get(&ArgSlot::Positional(2)), Some(&ArgValue::Null));
        args.set(&ArgSlot::Keyword("y".into()), json!(20));
        assert_eq!(args.keyword("y"), Some(&json!(20)));
    }

    #[test]
    fn test_decorator_arguments_from_json() {
        let args = DecoratorArguments::from(json!(["x", 2]));
        assert_eq!(args.positional().len(), 2);
        assert!(args.keyword().is_empty());
        let args = DecoratorArguments::from(json!({"binary": "date", "nodes": 3}));
        assert_eq!(args.get_string("binary").as_deref(), Some("date"));
        assert_eq!(args.get_string("nodes").as_deref(), Some("3"));
    }
}
