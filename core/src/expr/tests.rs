//! Tests for the expression evaluator

use super::*;
use serde_json::json;

fn scope(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("scope fixture must be an object, got {:?}", other),
    }
}

#[test]
fn test_plain_values_pass_through() {
    let s = scope(json!({}));
    let input = json!({ "a": 1, "b": [true, null, "text"], "c": { "d": 2.5 } });
    assert_eq!(eval_value(&s, &input).unwrap(), input);
}

#[test]
fn test_single_expression_keeps_type() {
    let s = scope(json!({ "x": 1, "items": [1, 2] }));
    assert_eq!(eval_str(&s, "${x}").unwrap(), json!(1));
    assert_eq!(eval_str(&s, "${items}").unwrap(), json!([1, 2]));
}

#[test]
fn test_interpolation_renders_strings() {
    let s = scope(json!({ "name": "ada", "n": 3, "obj": { "k": "v" } }));
    assert_eq!(eval_str(&s, "hi ${name}!").unwrap(), json!("hi ada!"));
    assert_eq!(eval_str(&s, "${n} items").unwrap(), json!("3 items"));
    assert_eq!(eval_str(&s, "obj=${obj}").unwrap(), json!(r#"obj={"k":"v"}"#));
}

#[test]
fn test_nested_structure_order_preserved() {
    let s = scope(json!({ "a": "A", "b": "B" }));
    let input = json!({ "z": "${a}", "y": ["${b}", { "x": "${a}${b}" }] });
    let out = eval_value(&s, &input).unwrap();

    assert_eq!(out, json!({ "z": "A", "y": ["B", { "x": "AB" }] }));
    let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["z", "y"]);
}

#[test]
fn test_expression_keys_are_evaluated() {
    let s = scope(json!({ "k": "dynamic" }));
    let out = eval_value(&s, &json!({ "${k}": 1 })).unwrap();
    assert_eq!(out, json!({ "dynamic": 1 }));
}

#[test]
fn test_undefined_variable_error() {
    let s = scope(json!({}));
    let err = eval_str(&s, "value: ${missing}").unwrap_err();

    assert_eq!(err.kind, EvalErrorKind::UndefinedVariable("missing".to_string()));
    assert_eq!(err.expression, "${missing}");
    assert!(err.to_string().contains("variable 'missing' is not defined"));
}

#[test]
fn test_eval_as_map_fails_fast() {
    let s = scope(json!({ "x": 1 }));
    let input = json!({ "a": "${x}", "b": "${nope}", "c": "${alsoMissing}" });
    let err = eval_as_map(&s, input.as_object().unwrap()).unwrap_err();

    // First failing entry wins
    assert_eq!(err.kind, EvalErrorKind::UndefinedVariable("nope".to_string()));
}

#[test]
fn test_arithmetic_keeps_integers() {
    let s = scope(json!({ "x": 7 }));
    assert_eq!(eval_str(&s, "${x + 1}").unwrap(), json!(8));
    assert_eq!(eval_str(&s, "${x * 2 - 4}").unwrap(), json!(10));
    assert_eq!(eval_str(&s, "${x / 2}").unwrap(), json!(3.5));
    assert_eq!(eval_str(&s, "${x % 4}").unwrap(), json!(3));
    assert_eq!(eval_str(&s, "${-x}").unwrap(), json!(-7));
}

#[test]
fn test_string_concatenation() {
    let s = scope(json!({ "n": 2 }));
    assert_eq!(eval_str(&s, "${'attempt ' + n}").unwrap(), json!("attempt 2"));
}

#[test]
fn test_comparisons_and_logic() {
    let s = scope(json!({ "x": 5, "name": "b", "flag": false }));
    assert_eq!(eval_str(&s, "${x > 3 && name == 'b'}").unwrap(), json!(true));
    assert_eq!(eval_str(&s, "${x <= 4 or flag}").unwrap(), json!(false));
    assert_eq!(eval_str(&s, "${not flag}").unwrap(), json!(true));
    assert_eq!(eval_str(&s, "${name < 'c'}").unwrap(), json!(true));
    assert_eq!(eval_str(&s, "${x == 5.0}").unwrap(), json!(true));
}

#[test]
fn test_short_circuit_skips_undefined() {
    let s = scope(json!({ "flag": false }));
    assert_eq!(eval_str(&s, "${flag && missing}").unwrap(), json!(false));
}

#[test]
fn test_ternary() {
    let s = scope(json!({ "x": 1 }));
    assert_eq!(eval_str(&s, "${x > 0 ? 'pos' : 'neg'}").unwrap(), json!("pos"));
}

#[test]
fn test_member_and_index_access() {
    let s = scope(json!({ "obj": { "list": [10, 20], "key": "v" } }));
    assert_eq!(eval_str(&s, "${obj.list[1]}").unwrap(), json!(20));
    assert_eq!(eval_str(&s, "${obj['key']}").unwrap(), json!("v"));
    assert_eq!(eval_str(&s, "${obj.absent}").unwrap(), json!(null));
}

#[test]
fn test_member_on_non_object_is_type_error() {
    let s = scope(json!({ "n": 42 }));
    let err = eval_str(&s, "${n.foo}").unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::Type(ref msg) if msg.contains("Cannot access property 'foo'")));
}

#[test]
fn test_builtin_functions() {
    let s = scope(json!({ "items": [1, 2, 3] }));
    assert_eq!(eval_str(&s, "${hasVariable('items')}").unwrap(), json!(true));
    assert_eq!(eval_str(&s, "${hasVariable('other')}").unwrap(), json!(false));
    assert_eq!(eval_str(&s, "${size(items)}").unwrap(), json!(3));

    let err = eval_str(&s, "${launch()}").unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::UnknownFunction("launch".to_string()));
}

#[test]
fn test_malformed_expression() {
    let s = scope(json!({}));
    let err = eval_str(&s, "${1 +}").unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::Malformed(_)));
}

#[test]
fn test_condition_accepts_bare_expression() {
    let s = scope(json!({ "x": 2 }));
    assert!(eval_condition(&s, "${x > 1}").unwrap());
    assert!(eval_condition(&s, "x > 1").unwrap());
    assert!(!eval_condition(&s, "x > 5").unwrap());
}

#[test]
fn test_eval_as_expected_shape() {
    let s = scope(json!({ "n": 3 }));
    let n: u32 = eval_as(&s, &json!("${n}")).unwrap();
    assert_eq!(n, 3);

    let err = eval_as::<u32>(&s, &json!("text")).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::Type(_)));
}
