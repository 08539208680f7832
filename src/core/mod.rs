pub mod arguments;
pub mod call;
pub mod context;
pub mod decorator;
pub mod element;
pub mod error;
pub mod function;
pub mod hooks;
pub mod normalize;
pub mod runtime;
pub mod scheduler;
pub mod transform;

/// The dynamic value type carried by task arguments and results.
pub type ArgValue = serde_json::Value;
