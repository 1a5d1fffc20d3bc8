//! Tests for task invocation, failures and retries

use super::helpers::*;
use crate::model::Step;
use crate::vm::commands::RETRY_ATTEMPT_VAR;
use crate::vm::errors;
use crate::vm::{RunOutcome, Runtime, TaskError, TaskResult};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn failure(outcome: RunOutcome) -> crate::vm::ErrorInfo {
    let RunOutcome::Failed { error } = outcome else {
        unreachable!("Expected failure, got {:?}", outcome);
    };
    error
}

#[test]
fn test_exit_code_failure() {
    let rt = Runtime::builder()
        .task("ansible", task(|_ctx, _input| Ok(TaskResult::exited(2))))
        .build();
    let run = run(
        &rt,
        json!({ "flows": { "default": [{ "type": "task", "name": "ansible" }] } }),
    );

    let error = failure(run.outcome);
    assert_eq!(error.code, errors::TASK_FAILURE);
    assert_eq!(error.message, "Process finished with exit code 2");
    assert_eq!(error.payload, Some(json!({ "exitCode": 2 })));
}

#[test]
fn test_task_error_is_failure() {
    let rt = Runtime::builder()
        .task("broken", task(|_ctx, _input| Err(TaskError::failed("nope"))))
        .build();
    let run = run(
        &rt,
        json!({ "flows": { "default": [{ "type": "task", "name": "broken" }] } }),
    );

    let error = failure(run.outcome);
    assert_eq!(error.code, errors::TASK_FAILURE);
    assert_eq!(error.message, "nope");
}

#[test]
fn test_ignore_errors_records_failure() {
    let rt = Runtime::builder()
        .task("flaky", task(|_ctx, _input| Ok(TaskResult::failure("disk full"))))
        .build();
    let run = run(
        &rt,
        json!({
            "flows": {
                "default": [
                    { "type": "task", "name": "flaky", "out": "r", "ignoreErrors": true },
                    { "type": "set", "vars": { "after": "${r.ok}" } }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    let v = vars(&run.state);
    assert_eq!(v["r"], json!({ "ok": false, "error": "disk full" }));
    assert_eq!(v["after"], json!(false));
}

#[test]
fn test_input_evaluation_error() {
    let run = run(
        &runtime(),
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "n": 1 } },
                    { "type": "task", "name": "echo", "input": { "v": "${n.field}" } }
                ]
            }
        }),
    );

    let error = failure(run.outcome);
    assert_eq!(error.code, errors::EVALUATION_ERROR);
    assert!(error.message.contains("Cannot access property 'field'"));
}

fn attempt_counting_task(
    calls: Arc<AtomicU32>,
    succeed_on: u64,
) -> impl crate::vm::Task + 'static {
    task(move |ctx, _input| {
        calls.fetch_add(1, Ordering::SeqCst);
        let attempt = ctx
            .execution()
            .peek_frame()
            .and_then(|f| f.get_local(RETRY_ATTEMPT_VAR))
            .and_then(JsonValue::as_u64)
            .unwrap_or(0);

        if attempt < succeed_on {
            Ok(TaskResult::failure(format!("attempt {} failed", attempt)))
        } else {
            Ok(TaskResult::success().with_value("attempt", json!(attempt)))
        }
    })
}

#[test]
fn test_retry_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let rt = Runtime::builder()
        .task("flaky", attempt_counting_task(calls.clone(), 2))
        .build();
    let run = run(
        &rt,
        json!({
            "flows": {
                "default": [
                    { "type": "task", "name": "flaky", "out": "r", "retry": { "times": 3 } }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(vars(&run.state)["r"], json!({ "attempt": 2 }));
    assert_eq!(run.state.frame_count(), 1);
}

#[test]
fn test_retry_exhausted() {
    let calls = Arc::new(AtomicU32::new(0));
    let rt = Runtime::builder()
        .task("flaky", attempt_counting_task(calls.clone(), u64::MAX))
        .build();
    let run = run(
        &rt,
        json!({
            "flows": {
                "default": [
                    { "type": "task", "name": "flaky", "retry": { "times": 2 } }
                ]
            }
        }),
    );

    let error = failure(run.outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(error.message, "attempt 2 failed");
}

#[test]
fn test_context_accessors() {
    let rt = Runtime::builder()
        .working_dir("/srv/work")
        .task(
            "inspect",
            task(|ctx, _input| {
                let x = ctx.variables().get("x").cloned().unwrap_or(JsonValue::Null);
                let doubled = ctx.eval(&json!("${x * 2}"))?;
                let small: bool = ctx.eval_as(&json!("${x < 100}"))?;
                ctx.set_variable("fromTask", json!("set"));

                Ok(TaskResult::success()
                    .with_value("x", x)
                    .with_value("doubled", doubled)
                    .with_value("small", json!(small))
                    .with_value("cwd", json!(ctx.working_directory().display().to_string()))
                    .with_value("instance", json!(ctx.process_instance_id().to_string()))
                    .with_value("thread", json!(ctx.thread_id().0)))
            }),
        )
        .build();
    let run = run(
        &rt,
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "x": 21 } },
                    { "type": "task", "name": "inspect", "out": "r" }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    let v = vars(&run.state);
    assert_eq!(
        v["r"],
        json!({
            "x": 21,
            "doubled": 42,
            "small": true,
            "cwd": "/srv/work",
            "instance": run.state.instance_id.to_string(),
            "thread": 0
        })
    );
    assert_eq!(v["fromTask"], json!("set"));
}

#[test]
fn test_context_compiles_steps() {
    let rt = Runtime::builder()
        .task(
            "dynamic",
            task(|ctx, input| {
                let step: Step = serde_json::from_value(json!({
                    "type": "set",
                    "vars": { "generated": "${x + 1}" }
                }))
                .map_err(|e| TaskError::failed(e.to_string()))?;
                let command = ctx
                    .compile(&step)
                    .map_err(|e| TaskError::failed(e.to_string()))?;
                ctx.execution().push_command(command);

                // Invalid steps are rejected before anything runs
                let invalid: Step = serde_json::from_value(json!({ "type": "set", "vars": {} }))
                    .map_err(|e| TaskError::failed(e.to_string()))?;
                let rejected = ctx.compile(&invalid).is_err();

                Ok(TaskResult::success()
                    .with_value("rejected", json!(rejected))
                    .with_values(input))
            }),
        )
        .build();
    let run = run(
        &rt,
        json!({
            "flows": {
                "default": [
                    { "type": "set", "vars": { "x": 1 } },
                    { "type": "task", "name": "dynamic", "input": { "k": "v" } }
                ]
            }
        }),
    );

    assert_eq!(run.outcome, RunOutcome::Done);
    let v = vars(&run.state);
    assert_eq!(v["generated"], json!(2));
    assert_eq!(v["rejected"], json!(true));
    assert_eq!(v["k"], json!("v"));
}
