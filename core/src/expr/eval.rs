//! Expression evaluation
//!
//! Walks the expression AST against a `Scope`. Values are plain JSON values so
//! anything a task returns can flow back into later expressions.

use serde_json::{Map, Number, Value as JsonValue};

use super::ast::{BinaryOp, Expr, Segment, Template, UnaryOp};
use super::error::EvalErrorKind;

/* ===================== Scope ===================== */

/// Variable lookup used by the evaluator
pub trait Scope {
    /// Resolve a variable, or `None` when it is not defined
    fn lookup(&self, name: &str) -> Option<&JsonValue>;

    fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Scope for Map<String, JsonValue> {
    fn lookup(&self, name: &str) -> Option<&JsonValue> {
        self.get(name)
    }
}

impl<S: Scope + ?Sized> Scope for &S {
    fn lookup(&self, name: &str) -> Option<&JsonValue> {
        (**self).lookup(name)
    }
}

type EvalResult = Result<JsonValue, EvalErrorKind>;

/* ===================== Templates ===================== */

/// Render a parsed template
///
/// A template made of exactly one expression yields that expression's value
/// unchanged; anything else is rendered to a string.
pub fn eval_template(scope: &dyn Scope, template: &Template) -> Result<JsonValue, (String, EvalErrorKind)> {
    if let Some(Segment::Expr { source, expr }) = single(template) {
        return eval_expr(scope, expr).map_err(|kind| (source.clone(), kind));
    }

    let mut out = String::new();
    for segment in &template.segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Expr { source, expr } => {
                let value = eval_expr(scope, expr).map_err(|kind| (source.clone(), kind))?;
                out.push_str(&render(&value));
            }
        }
    }
    Ok(JsonValue::String(out))
}

fn single(template: &Template) -> Option<&Segment> {
    match template.segments.as_slice() {
        [segment @ Segment::Expr { .. }] => Some(segment),
        _ => None,
    }
}

/// String form of a value inside interpolated text
pub fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/* ===================== Expressions ===================== */

/// Evaluate an expression to a value
pub fn eval_expr(scope: &dyn Scope, expr: &Expr) -> EvalResult {
    match expr {
        Expr::Null => Ok(JsonValue::Null),
        Expr::Bool(b) => Ok(JsonValue::Bool(*b)),
        Expr::Number(n) => Ok(JsonValue::Number(n.clone())),
        Expr::Str(s) => Ok(JsonValue::String(s.clone())),

        Expr::List(items) => items
            .iter()
            .map(|item| eval_expr(scope, item))
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),

        Expr::Ident(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalErrorKind::UndefinedVariable(name.clone())),

        Expr::Member { object, property } => {
            let base = eval_expr(scope, object)?;
            member(&base, property)
        }

        Expr::Index { object, index } => {
            let base = eval_expr(scope, object)?;
            let key = eval_expr(scope, index)?;
            index_value(&base, &key)
        }

        Expr::Unary { op, operand } => {
            let v = eval_expr(scope, operand)?;
            match op {
                UnaryOp::Not => Ok(JsonValue::Bool(!is_truthy(&v))),
                UnaryOp::Neg => negate(&v),
            }
        }

        Expr::Binary { op, left, right } => eval_binary(scope, *op, left, right),

        Expr::Ternary {
            test,
            then,
            otherwise,
        } => {
            if is_truthy(&eval_expr(scope, test)?) {
                eval_expr(scope, then)
            } else {
                eval_expr(scope, otherwise)
            }
        }

        Expr::Call { function, args } => call_builtin(scope, function, args),
    }
}

/// Check if value is truthy (for conditionals)
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Null => false,
        _ => true,
    }
}

fn member(base: &JsonValue, property: &str) -> EvalResult {
    match base {
        JsonValue::Object(map) => Ok(map.get(property).cloned().unwrap_or(JsonValue::Null)),
        other => Err(EvalErrorKind::Type(format!(
            "Cannot access property '{}' on {}",
            property,
            type_name(other)
        ))),
    }
}

fn index_value(base: &JsonValue, key: &JsonValue) -> EvalResult {
    match (base, key) {
        (JsonValue::Array(items), JsonValue::Number(n)) => {
            let idx = n.as_u64().ok_or_else(|| {
                EvalErrorKind::Type(format!("Invalid list index {}", n))
            })?;
            Ok(items.get(idx as usize).cloned().unwrap_or(JsonValue::Null))
        }
        (JsonValue::Object(_), JsonValue::String(k)) => member(base, k),
        (base, key) => Err(EvalErrorKind::Type(format!(
            "Cannot index {} with {}",
            type_name(base),
            type_name(key)
        ))),
    }
}

fn negate(v: &JsonValue) -> EvalResult {
    match v {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Ok(JsonValue::from(i))
            } else {
                float(-to_f64(n))
            }
        }
        other => Err(EvalErrorKind::Type(format!("Cannot negate {}", type_name(other)))),
    }
}

fn eval_binary(scope: &dyn Scope, op: BinaryOp, left: &Expr, right: &Expr) -> EvalResult {
    // Logical operators short-circuit
    match op {
        BinaryOp::And => {
            let l = eval_expr(scope, left)?;
            if !is_truthy(&l) {
                return Ok(JsonValue::Bool(false));
            }
            return Ok(JsonValue::Bool(is_truthy(&eval_expr(scope, right)?)));
        }
        BinaryOp::Or => {
            let l = eval_expr(scope, left)?;
            if is_truthy(&l) {
                return Ok(JsonValue::Bool(true));
            }
            return Ok(JsonValue::Bool(is_truthy(&eval_expr(scope, right)?)));
        }
        _ => {}
    }

    let l = eval_expr(scope, left)?;
    let r = eval_expr(scope, right)?;

    match op {
        BinaryOp::Eq => Ok(JsonValue::Bool(loose_eq(&l, &r))),
        BinaryOp::Ne => Ok(JsonValue::Bool(!loose_eq(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &l, &r),
        BinaryOp::Add => match (&l, &r) {
            (JsonValue::String(_), _) | (_, JsonValue::String(_)) => {
                Ok(JsonValue::String(format!("{}{}", render(&l), render(&r))))
            }
            _ => arithmetic(op, &l, &r),
        },
        _ => arithmetic(op, &l, &r),
    }
}

fn loose_eq(l: &JsonValue, r: &JsonValue) -> bool {
    match (l, r) {
        (JsonValue::Number(a), JsonValue::Number(b)) => to_f64(a) == to_f64(b),
        _ => l == r,
    }
}

fn compare(op: BinaryOp, l: &JsonValue, r: &JsonValue) -> EvalResult {
    let ordering = match (l, r) {
        (JsonValue::Number(a), JsonValue::Number(b)) => to_f64(a).partial_cmp(&to_f64(b)),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| {
        EvalErrorKind::Type(format!(
            "Cannot compare {} {} {}",
            type_name(l),
            op.symbol(),
            type_name(r)
        ))
    })?;

    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(JsonValue::Bool(result))
}

fn arithmetic(op: BinaryOp, l: &JsonValue, r: &JsonValue) -> EvalResult {
    let (JsonValue::Number(a), JsonValue::Number(b)) = (l, r) else {
        return Err(EvalErrorKind::Type(format!(
            "Cannot apply '{}' to {} and {}",
            op.symbol(),
            type_name(l),
            type_name(r)
        )));
    };

    // Integer arithmetic stays integral while it can
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(JsonValue::from(v));
        }
    }

    let (x, y) = (to_f64(a), to_f64(b));
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0.0 {
        return Err(EvalErrorKind::Type("Division by zero".to_string()));
    }

    float(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => x % y,
    })
}

fn call_builtin(scope: &dyn Scope, function: &str, args: &[Expr]) -> EvalResult {
    match (function, args) {
        ("hasVariable", [name]) => match eval_expr(scope, name)? {
            JsonValue::String(name) => Ok(JsonValue::Bool(scope.contains(&name))),
            other => Err(EvalErrorKind::Type(format!(
                "hasVariable expects a string, got {}",
                type_name(&other)
            ))),
        },
        ("size", [value]) => {
            let len = match eval_expr(scope, value)? {
                JsonValue::Array(items) => items.len(),
                JsonValue::Object(map) => map.len(),
                JsonValue::String(s) => s.chars().count(),
                JsonValue::Null => 0,
                other => {
                    return Err(EvalErrorKind::Type(format!(
                        "size expects a collection, got {}",
                        type_name(&other)
                    )))
                }
            };
            Ok(JsonValue::from(len))
        }
        ("hasVariable" | "size", _) => Err(EvalErrorKind::Type(format!(
            "Wrong number of arguments for {}: {}",
            function,
            args.len()
        ))),
        _ => Err(EvalErrorKind::UnknownFunction(function.to_string())),
    }
}

/* ===================== Helpers ===================== */

fn to_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn float(v: f64) -> EvalResult {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .ok_or_else(|| EvalErrorKind::Type(format!("Result is not a finite number: {}", v)))
}

pub fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}
