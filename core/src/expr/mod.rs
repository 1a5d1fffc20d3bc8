//! # Expression Evaluator
//!
//! Resolves `${...}` expressions embedded anywhere inside a value: strings,
//! lists and mappings are walked recursively and rebuilt with the same shape and
//! order. Values without expressions pass through unchanged.
//!
//! ```
//! use serde_json::json;
//! use tempo_core::expr;
//!
//! let scope = json!({ "user": { "name": "ada" }, "n": 2 });
//! let scope = scope.as_object().unwrap();
//!
//! let v = expr::eval_value(scope, &json!({ "greeting": "hi ${user.name}", "next": "${n + 1}" })).unwrap();
//! assert_eq!(v, json!({ "greeting": "hi ada", "next": 3 }));
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod parser;

#[cfg(test)]
mod tests;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

pub use error::{EvalErrorKind, EvaluationError};
pub use eval::{is_truthy, Scope};

/// Marker that opens an embedded expression
const OPEN: &str = "${";

/// Check whether a string contains an embedded expression
pub fn has_expression(s: &str) -> bool {
    s.contains(OPEN)
}

/// Evaluate every embedded expression inside `value`
pub fn eval_value(scope: &dyn Scope, value: &JsonValue) -> Result<JsonValue, EvaluationError> {
    match value {
        JsonValue::String(s) => eval_str(scope, s),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| eval_value(scope, item))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        JsonValue::Object(map) => eval_as_map(scope, map).map(JsonValue::Object),
        other => Ok(other.clone()),
    }
}

/// Evaluate a string template
pub fn eval_str(scope: &dyn Scope, s: &str) -> Result<JsonValue, EvaluationError> {
    if !has_expression(s) {
        return Ok(JsonValue::String(s.to_string()));
    }

    let template = parser::parse_template(s)?;
    eval::eval_template(scope, &template)
        .map_err(|(source, kind)| EvaluationError::new(format!("${{{}}}", source), kind))
}

/// Evaluate a batch of named inputs in one pass
///
/// Fail-fast: the first failing entry aborts the whole map, so callers never
/// see a partially evaluated batch.
pub fn eval_as_map(
    scope: &dyn Scope,
    input: &Map<String, JsonValue>,
) -> Result<Map<String, JsonValue>, EvaluationError> {
    let mut out = Map::with_capacity(input.len());
    for (key, value) in input {
        let key = if has_expression(key) {
            eval::render(&eval_str(scope, key)?)
        } else {
            key.clone()
        };
        out.insert(key, eval_value(scope, value)?);
    }
    Ok(out)
}

/// Evaluate a value and convert the result into the expected shape
pub fn eval_as<T: DeserializeOwned>(
    scope: &dyn Scope,
    value: &JsonValue,
) -> Result<T, EvaluationError> {
    let resolved = eval_value(scope, value)?;
    serde_json::from_value(resolved).map_err(|e| {
        EvaluationError::new(value.to_string(), EvalErrorKind::Type(e.to_string()))
    })
}

/// Evaluate a condition
///
/// Accepts either a template (`"${x > 1}"`) or a bare expression (`"x > 1"`).
pub fn eval_condition(scope: &dyn Scope, source: &str) -> Result<bool, EvaluationError> {
    let value = if has_expression(source) {
        eval_str(scope, source)?
    } else {
        let expr = parser::parse_expression(source)?;
        eval::eval_expr(scope, &expr).map_err(|kind| EvaluationError::new(source, kind))?
    };
    Ok(is_truthy(&value))
}
