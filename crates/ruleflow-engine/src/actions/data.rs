//! `store-data` and `transform-data` actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatcher::Outcome;
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::value::{as_number, value_to_string};

/// Config of a `store-data` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDataConfig {
    #[serde(alias = "variable", alias = "name")]
    pub key: String,

    #[serde(default)]
    pub value: Value,
}

/// Place the resolved value into the run's variables.
pub(super) fn store(
    config: StoreDataConfig,
    ctx: &mut ExecutionContext,
) -> Result<Outcome, ActionError> {
    if config.key.trim().is_empty() {
        return Err(ActionError::MissingField("key"));
    }

    ctx.set_variable(config.key.clone(), config.value.clone());

    Ok(Outcome::success(serde_json::json!({
        "key": config.key,
        "value": config.value,
    })))
}

/// Transformation applied to a source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransformOperation {
    #[default]
    Copy,
    Uppercase,
    Lowercase,
    Sum,
}

/// One output of a `transform-data` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Dotted path of the source field.
    pub source: String,

    #[serde(default, alias = "transform", alias = "op")]
    pub operation: TransformOperation,
}

/// Config of a `transform-data` action, keyed by output name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    #[serde(default, alias = "outputs", alias = "mappings")]
    pub transformations: BTreeMap<String, TransformSpec>,
}

/// Build one output value per declared key.
pub(super) fn transform(
    config: TransformConfig,
    ctx: &ExecutionContext,
) -> Result<Outcome, ActionError> {
    let mut output = serde_json::Map::new();

    for (key, spec) in config.transformations {
        let source = ctx.resolve(&spec.source).cloned().unwrap_or(Value::Null);
        output.insert(key, apply(spec.operation, source));
    }

    Ok(Outcome::success(Value::Object(output)))
}

fn apply(operation: TransformOperation, source: Value) -> Value {
    match operation {
        TransformOperation::Copy => source,
        TransformOperation::Uppercase => Value::String(value_to_string(&source).to_uppercase()),
        TransformOperation::Lowercase => Value::String(value_to_string(&source).to_lowercase()),
        TransformOperation::Sum => number_value(sum(&source)),
    }
}

/// Sum numeric elements; non-numeric elements are skipped.
fn sum(source: &Value) -> f64 {
    match source {
        Value::Array(items) => items.iter().filter_map(as_number).sum(),
        other => as_number(other).unwrap_or(0.0),
    }
}

/// Integral sums stay integers in the output.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
