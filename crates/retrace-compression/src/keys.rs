//! Grouping keys for compressors
//!
//! A key function maps an action to the string that decides whether two
//! actions of the same `f_id` address the same thing.

use retrace_model::ActionNode;
use serde_json::Value;
use std::sync::Arc;

/// Grouping key of an action
pub type KeyFn = Arc<dyn Fn(&ActionNode) -> String + Send + Sync>;

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn first_input_id(action: &ActionNode) -> String {
    action
        .inputs()
        .first()
        .map_or_else(|| String::from("-"), |r| r.id().get().to_string())
}

/// Key from a closure
pub fn from_fn<F>(f: F) -> KeyFn
where
    F: Fn(&ActionNode) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

/// `"{first input id}_{parameter[name]}"`: same parameter on the same target
#[must_use]
pub fn first_input_and_param(name: &str) -> KeyFn {
    let name = name.to_owned();
    Arc::new(move |a: &ActionNode| format!("{}_{}", first_input_id(a), render(a.parameter().get(&name))))
}

/// Value of one parameter field
#[must_use]
pub fn param(name: &str) -> KeyFn {
    let name = name.to_owned();
    Arc::new(move |a: &ActionNode| render(a.parameter().get(&name)))
}

/// Id of the first input
#[must_use]
pub fn first_input() -> KeyFn {
    Arc::new(first_input_id)
}

/// Whole parameter payload. `serde_json` maps are ordered, so equal payloads
/// render equally.
#[must_use]
pub fn parameter() -> KeyFn {
    Arc::new(|a: &ActionNode| a.parameter().to_string())
}
