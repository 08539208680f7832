use crate::core::ArgValue;
use crate::core::arguments::DecoratorArguments;
use crate::core::call::Call;
use crate::core::decorator::Annotation;
use crate::core::element::CoreElementBuilder;
use crate::core::error::TaskError;
use crate::core::function::FunctionSignature;
use crate::core::transform::{TransformFn, TransformationSpec, apply_transformations};
use std::collections::HashMap;

/// `@data_transformation`: replaces task arguments by transformed values
/// before the task runs. Leaves the descriptor untouched.
#[derive(Debug, Clone)]
pub struct DataTransformation {
    arguments: DecoratorArguments,
    specs: Vec<TransformationSpec>,
}

impl DataTransformation {
    pub const NAME: &'static str = "@data_transformation";

    /// Transforms `parameter` with `transform`.
    pub fn new(parameter: impl Into<String>, transform: TransformFn) -> Self {
        Self::from_specs(vec![TransformationSpec::new(parameter, transform)])
    }

    /// Transforms `parameter` with `transform`, passing `kwargs` along. An
    /// `is_workflow` entry selects inline execution.
    pub fn with_kwargs(
        parameter: impl Into<String>,
        transform: TransformFn,
        kwargs: HashMap<String, ArgValue>,
    ) -> Self {
        Self::from_specs(vec![
            TransformationSpec::new(parameter, transform).with_kwargs(kwargs),
        ])
    }

    pub fn from_specs(specs: Vec<TransformationSpec>) -> Self {
        let mut arguments = DecoratorArguments::new();
        for spec in &specs {
            arguments = arguments.with_positional(spec.parameter());
        }
        Self { arguments, specs }
    }

    pub fn specs(&self) -> &[TransformationSpec] {
        &self.specs
    }
}

impl Annotation for DataTransformation {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn arguments(&self) -> &DecoratorArguments {
        &self.arguments
    }

    fn configure(
        &self,
        _element: &mut CoreElementBuilder,
        _function: &FunctionSignature,
    ) -> Result<(), TaskError> {
        Ok(())
    }

    fn prepare(&self, call: &mut Call, function: &FunctionSignature) -> Result<(), TaskError> {
        if !call.context().configures() {
            return Ok(());
        }
        if call.has_call_transformations() {
            return match call.take_transformations() {
                Some(specs) => apply_transformations(call, function, &specs),
                None => Ok(()),
            };
        }
        apply_transformations(call, function, &self.specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arguments::Arguments;
    use crate::core::context::ExecutionContext;
    use crate::core::runtime::Runtime;
    use serde_json::json;

    fn add(n: i64) -> TransformFn {
        TransformFn::inline(move |v, _| Ok(json!(v.as_i64().unwrap_or_default() + n)))
    }

    #[test]
    fn test_call_time_specs_replace_declared_ones() {
        let runtime = Runtime::local();
        let sig = crate::signature!("m.f(x, y)");
        let declared = TransformationSpec::new("x", add(1)).workflow(true);
        let dt = DataTransformation::from_specs(vec![declared]);
        let arguments = Arguments::new().arg(1).arg(1);
        let mut call = Call::with_context(&runtime, ExecutionContext::master(), arguments)
            .with_transformations(vec![TransformationSpec::new("y", add(100)).workflow(true)]);
        dt.prepare(&mut call, &sig).unwrap();
        assert_eq!(call.arguments().positional_values(), [json!(1), json!(101)]);

        // A second layer sees the call-time specs as consumed.
        dt.prepare(&mut call, &sig).unwrap();
        assert_eq!(call.arguments().positional_values(), [json!(1), json!(101)]);
    }

    #[test]
    fn test_plain_worker_skips_transformations() {
        let runtime = Runtime::local();
        let sig = crate::signature!("m.f(x)");
        let dt = DataTransformation::new("x", add(1));
        let arguments = Arguments::new().arg(1);
        let mut call = Call::with_context(&runtime, ExecutionContext::worker(), arguments);
        dt.prepare(&mut call, &sig).unwrap();
        assert_eq!(call.arguments().get_positional(0), Some(&json!(1)));
        assert!(call.dependencies().is_empty());
    }

    #[test]
    fn test_kwargs_forwarded() {
        let runtime = Runtime::local();
        let sig = crate::signature!("m.f(x)");
        let scale = TransformFn::inline(|v, kw| {
            let factor = kw.get("factor").and_then(ArgValue::as_i64).unwrap_or(1);
            Ok(json!(v.as_i64().unwrap_or_default() * factor))
        });
        let kwargs = HashMap::from([
            ("factor".to_string(), json!(3)),
            ("is_workflow".to_string(), json!(1)),
        ]);
        let dt = DataTransformation::with_kwargs("x", scale, kwargs);
        assert_eq!(dt.arguments().positional(), [json!("x")]);
        let arguments = Arguments::new().kwarg("x", 2);
        let mut call = Call::with_context(&runtime, ExecutionContext::master(), arguments);
        dt.prepare(&mut call, &sig).unwrap();
        assert_eq!(call.arguments().keyword("x"), Some(&json!(6)));
    }
}
