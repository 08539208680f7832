use crate::core::ArgValue;
use crate::core::arguments::Arguments;
use crate::core::call::{Call, ConfigurationGate};
use crate::core::context::ExecutionContext;
use crate::core::error::TaskError;
use crate::core::runtime::Runtime;
use crate::core::scheduler::resolve_dependencies;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A declared parameter of an annotated function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<ArgValue>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// The external signature of an annotated function.
///
/// The name-to-position index is built once, when the signature is created,
/// so per-call parameter lookups never re-inspect the parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SignatureRepr", into = "SignatureRepr")]
pub struct FunctionSignature {
    module: String,
    name: String,
    parameters: Vec<Parameter>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct SignatureRepr {
    module: String,
    name: String,
    parameters: Vec<Parameter>,
}

impl From<SignatureRepr> for FunctionSignature {
    fn from(repr: SignatureRepr) -> Self {
        Self::with_parameters(repr.module, repr.name, repr.parameters)
    }
}

impl From<FunctionSignature> for SignatureRepr {
    fn from(sig: FunctionSignature) -> Self {
        Self {
            module: sig.module,
            name: sig.name,
            parameters: sig.parameters,
        }
    }
}

impl FunctionSignature {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_parameters(module, name, Vec::new())
    }

    pub fn with_parameters(
        module: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        let index = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Self {
            module: module.into(),
            name: name.into(),
            parameters,
            index,
        }
    }

    /// Add a parameter without a default.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.index.insert(name.clone(), self.parameters.len());
        self.parameters.push(Parameter::new(name));
        self
    }

    /// Add a parameter with a default value.
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<ArgValue>,
    ) -> Self {
        let name = name.into();
        self.index.insert(name.clone(), self.parameters.len());
        self.parameters.push(Parameter::with_default(name, default));
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `module.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn position(&self, parameter: &str) -> Option<usize> {
        self.index.get(parameter).copied()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.position(name).map(|i| &self.parameters[i])
    }

    pub fn default_of(&self, name: &str) -> Option<&ArgValue> {
        self.parameter(name).and_then(|p| p.default.as_ref())
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.qualified_name())?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &p.default {
                Some(default) => write!(f, "{}={}", p.name, default)?,
                None => f.write_str(&p.name)?,
            }
        }
        f.write_str(")")
    }
}

impl FromStr for FunctionSignature {
    type Err = String;

    /// Parses shorthand syntax: "module.name(x, y=3)". Defaults are JSON
    /// literals; anything that does not parse as JSON is taken as a string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (path, rest) = match s.find('(') {
            Some(open) => {
                if !s.ends_with(')') {
                    return Err("Signature must end with ')'".to_string());
                }
                (&s[..open], &s[open + 1..s.len() - 1])
            }
            None => (s, ""),
        };
        let (module, name) = path
            .trim()
            .rsplit_once('.')
            .ok_or_else(|| "Signature must be qualified as 'module.name'".to_string())?;
        if module.is_empty() || name.is_empty() {
            return Err("Signature must be qualified as 'module.name'".to_string());
        }

        let mut sig = FunctionSignature::new(module, name);
        for raw in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            sig = match raw.split_once('=') {
                Some((param, default)) => {
                    let default = default.trim();
                    let value = serde_json::from_str(default)
                        .unwrap_or_else(|_| ArgValue::from(default));
                    sig.param_with_default(param.trim(), value)
                }
                None => sig.param(raw),
            };
        }
        Ok(sig)
    }
}

/// Macro for rapid signature creation: signature!("app.add(x, y=1)")
#[macro_export]
macro_rules! signature {
    ($s:expr) => {
        $s.parse::<$crate::core::function::FunctionSignature>()
            .expect("Invalid signature shorthand")
    };
}

/// Anything that can be invoked through the annotation protocol: the user's
/// function itself, or a decorator wrapping it.
#[async_trait]
pub trait TaskFunction: Send + Sync {
    /// The external signature of the wrapped user function.
    fn signature(&self) -> &FunctionSignature;

    /// Runs one layer of the call. Wrappers delegate inward with the same
    /// `Call`, which is how they share the per-call descriptor.
    async fn invoke(&self, call: &mut Call) -> Result<ArgValue, TaskError>;

    /// The gate shared by the annotation layers of this stack. `None` for a
    /// bare function.
    fn configuration_gate(&self) -> Option<&ConfigurationGate> {
        None
    }

    /// Starts a fresh call under the runtime's current context.
    async fn call(&self, runtime: &Runtime, arguments: Arguments) -> Result<ArgValue, TaskError> {
        let mut call = Call::new(runtime, arguments);
        self.invoke(&mut call).await
    }
}

type Body = dyn Fn(&Invocation<'_>) -> Result<ArgValue, TaskError> + Send + Sync;

/// The innermost layer: the user's own code.
pub struct UserFunction {
    signature: FunctionSignature,
    body: Arc<Body>,
}

impl UserFunction {
    pub fn new<F>(signature: FunctionSignature, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<ArgValue, TaskError> + Send + Sync + 'static,
    {
        Self {
            signature,
            body: Arc::new(body),
        }
    }

    pub fn into_arc(self) -> Arc<dyn TaskFunction> {
        Arc::new(self)
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("signature", &self.signature)
            .finish()
    }
}

#[async_trait]
impl TaskFunction for UserFunction {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn invoke(&self, call: &mut Call) -> Result<ArgValue, TaskError> {
        let dependencies = call.take_dependencies();
        if !dependencies.is_empty() {
            log::debug!(
                "Waiting for {} transformed argument(s) of {}",
                dependencies.len(),
                self.signature.qualified_name()
            );
            resolve_dependencies(dependencies, call.arguments_mut()).await?;
        }
        call.commit_configuration();
        let invocation = Invocation {
            call: &*call,
            signature: &self.signature,
        };
        (self.body)(&invocation)
    }
}

/// What the user's body sees of the call.
pub struct Invocation<'a> {
    call: &'a Call,
    signature: &'a FunctionSignature,
}

impl<'a> Invocation<'a> {
    /// Resolves a declared parameter: keyword first, then position, then the
    /// declared default.
    pub fn arg(&self, name: &str) -> Option<&'a ArgValue> {
        let arguments = self.call.arguments();
        if let Some(value) = arguments.keyword(name) {
            return Some(value);
        }
        let position = self.signature.position(name)?;
        arguments
            .get_positional(position)
            .or_else(|| self.signature.default_of(name))
    }

    /// Like [`arg`](Self::arg), failing with an execution error when absent.
    pub fn require(&self, name: &str) -> Result<&'a ArgValue, TaskError> {
        self.arg(name).ok_or_else(|| {
            TaskError::execution(format!(
                "{} requires argument `{}`",
                self.signature.qualified_name(),
                name
            ))
        })
    }

    pub fn keyword(&self, name: &str) -> Option<&'a ArgValue> {
        self.call.arguments().keyword(name)
    }

    pub fn arguments(&self) -> &'a Arguments {
        self.call.arguments()
    }

    /// Reads an attribute of the receiver as seen by this call, including any
    /// overrides opened by the enclosing annotation layers.
    pub fn receiver_attribute(&self, name: &str) -> Option<&'a ArgValue> {
        self.call.receiver_attribute(name)
    }

    pub fn prepend_strings(&self) -> bool {
        self.call.prepend_strings()
    }

    pub fn context(&self) -> ExecutionContext {
        self.call.context()
    }

    pub fn signature(&self) -> &'a FunctionSignature {
        self.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_shorthand() {
        let sig: FunctionSignature = "app.add(x, y=3, label=total)".parse().unwrap();
        assert_eq!(sig.module(), "app");
        assert_eq!(sig.name(), "add");
        assert_eq!(sig.position("y"), Some(1));
        assert_eq!(sig.default_of("y"), Some(&json!(3)));
        assert_eq!(sig.default_of("label"), Some(&json!("total")));
        assert_eq!(sig.default_of("x"), None);
        assert_eq!(sig.to_string(), "app.add(x, y=3, label=\"total\")");
    }

    #[test]
    fn test_signature_shorthand_rejects_unqualified_names() {
        assert!("add(x)".parse::<FunctionSignature>().is_err());
        assert!("app.add(x".parse::<FunctionSignature>().is_err());
        let bare: FunctionSignature = "app.tick".parse().unwrap();
        assert!(bare.parameters().is_empty());
    }

    #[test]
    fn test_signature_serde_rebuilds_index() {
        let sig = FunctionSignature::new("m", "f").param("a").param("b");
        let value = serde_json::to_value(&sig).unwrap();
        let back: FunctionSignature = serde_json::from_value(value).unwrap();
        assert_eq!(back.position("b"), Some(1));
        assert_eq!(back, sig);
    }

    #[tokio::test]
    async fn test_invocation_argument_lookup() {
        let runtime = Runtime::local();
        runtime.reset_context(ExecutionContext::master());
        let f = UserFunction::new(crate::signature!("m.f(x, y=3)"), |inv| {
            let x = inv.require("x")?.as_i64().unwrap_or_default();
            let y = inv.arg("y").and_then(ArgValue::as_i64).unwrap_or_default();
            Ok(json!(x * 10 + y))
        });
        let positional = f.call(&runtime, Arguments::new().arg(2)).await.unwrap();
        assert_eq!(positional, json!(23));
        let keyword = f
            .call(&runtime, Arguments::new().kwarg("x", 1).kwarg("y", 5))
            .await
            .unwrap();
        assert_eq!(keyword, json!(15));
        let missing = f.call(&runtime, Arguments::new()).await.unwrap_err();
        assert!(matches!(missing, TaskError::Execution(_)));
    }
}
