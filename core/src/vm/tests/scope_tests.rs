//! Tests for flow calls and variable scoping

use super::helpers::*;
use crate::vm::errors;
use crate::vm::RunOutcome;
use serde_json::json;

#[test]
fn test_call_copies_only_declared_outputs() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "x": 1 } },
                    { "type": "call", "flow": "sub", "input": { "y": "${x}" }, "out": ["z"] }
                ],
                "sub": [
                    { "type": "set", "vars": { "z": "${y + 1}" } },
                    { "type": "set", "vars": { "w": 5 } }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    let v = vars(&run.state);
    assert_eq!(v["z"], json!(2));
    assert!(!v.contains_key("w"));
    assert!(!v.contains_key("y"));
}

#[test]
fn test_callee_reads_caller_variables() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "x": 32 } },
                    { "type": "call", "flow": "sub", "out": ["answer"] }
                ],
                "sub": [
                    { "type": "set", "vars": { "answer": "${x + 10}" } }
                ]
            }
        }),
    );

    assert_eq!(vars(&run.state)["answer"], json!(42));
}

#[test]
fn test_nested_writes_stop_at_flow_boundary() {
    // A write inside a nested construct of a called flow lands in the called
    // flow's scope, never in the caller's
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "call", "flow": "sub" },
                    { "type": "set", "vars": { "done": true } }
                ],
                "sub": [
                    {
                        "type": "if",
                        "expression": "${true}",
                        "then": [{ "type": "set", "vars": { "inner": 1 } }]
                    },
                    { "type": "set", "vars": { "seen": "${inner}" } }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    let v = vars(&run.state);
    assert!(!v.contains_key("inner"));
    assert!(!v.contains_key("seen"));
    assert_eq!(v["done"], json!(true));
}

#[test]
fn test_nested_call_outputs_chain() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "call", "flow": "a", "out": ["fromB"] }
                ],
                "a": [
                    { "type": "call", "flow": "b", "input": { "n": 2 }, "out": ["fromB"] }
                ],
                "b": [
                    { "type": "set", "vars": { "fromB": "${n * 21}" } }
                ]
            }
        }),
    );

    assert_eq!(vars(&run.state)["fromB"], json!(42));
}

#[test]
fn test_dynamic_flow_name() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "target": "sub" } },
                    { "type": "call", "flow": "${target}", "out": ["r"] }
                ],
                "sub": [{ "type": "set", "vars": { "r": "called" } }]
            }
        }),
    );

    assert_eq!(vars(&run.state)["r"], json!("called"));
}

#[test]
fn test_dynamic_flow_not_found() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "target": "nope" } },
                    { "type": "call", "flow": "${target}" }
                ]
            }
        }),
    );

    let RunOutcome::Failed { error } = run.outcome else {
        unreachable!("Expected failure, got {:?}", run.outcome);
    };
    assert_eq!(error.code, errors::COMPILE_ERROR);
    assert_eq!(error.message, "Flow not found: nope");
}
