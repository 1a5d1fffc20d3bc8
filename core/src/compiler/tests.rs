//! Tests for step compilation

use super::*;
use crate::model::{RetryOptions, StepKind};
use maplit::btreemap;
use serde_json::{json, Map};

fn step(kind: StepKind) -> Step {
    Step::new(kind).at(Location::new(3, 5))
}

fn task(name: &str) -> Step {
    step(StepKind::Task {
        name: name.to_string(),
        input: Map::new(),
        out: None,
        retry: None,
        ignore_errors: false,
    })
}

fn definition(flows: std::collections::BTreeMap<String, Vec<Step>>) -> ProcessDefinition {
    ProcessDefinition::new(flows)
}

#[test]
fn test_compile_is_deterministic() {
    let pd = definition(btreemap! {
        "default".to_string() => vec![
            task("log"),
            step(StepKind::If {
                expression: "${x > 1}".to_string(),
                then: vec![task("echo")],
                otherwise: Some(vec![step(StepKind::Throw { exception: json!("small") })]),
            }),
        ],
    });

    let compiler = Compiler::new();
    let a = compiler.compile_flow(&pd, "default").unwrap();
    let b = compiler.compile_flow(&pd, "default").unwrap();
    assert_eq!(a, b);

    let Command::Block { commands } = a else {
        unreachable!("flow should compile to a block")
    };
    assert_eq!(commands.len(), 2);
    assert!(matches!(&commands[0], Command::TaskCall { name, .. } if name == "log"));
    assert!(matches!(&commands[1], Command::Conditional { otherwise: Some(_), .. }));
}

#[test]
fn test_missing_flow() {
    let pd = definition(btreemap! {});
    let err = Compiler::new().compile_flow(&pd, "nope").unwrap_err();
    assert_eq!(
        err,
        CompileError::FlowNotFound {
            name: "nope".to_string(),
            location: None
        }
    );
}

#[test]
fn test_call_to_missing_flow_fails_at_compile_time() {
    let pd = definition(btreemap! {});
    let call = step(StepKind::Call {
        flow: "missing".to_string(),
        input: Map::new(),
        out: vec![],
    });

    let err = Compiler::new().compile_step(&pd, &call).unwrap_err();
    assert!(matches!(err, CompileError::FlowNotFound { ref name, location: Some(ref loc) } if name == "missing" && *loc == Location::new(3, 5)));
}

#[test]
fn test_dynamic_call_is_deferred() {
    let pd = definition(btreemap! {});
    let call = step(StepKind::Call {
        flow: "${target}".to_string(),
        input: Map::new(),
        out: vec![],
    });
    assert!(Compiler::new().compile_step(&pd, &call).is_ok());
}

#[test]
fn test_retry_wraps_task_call() {
    let pd = definition(btreemap! {});
    let mut s = task("flaky");
    if let StepKind::Task { retry, .. } = &mut s.kind {
        *retry = Some(RetryOptions { times: 2 });
    }

    let command = Compiler::new().compile_step(&pd, &s).unwrap();
    let Command::Retry { body, times, attempt, .. } = command else {
        unreachable!("expected retry command")
    };
    assert_eq!((times, attempt), (2, 0));
    assert!(matches!(*body, Command::TaskCall { ref name, .. } if name == "flaky"));
}

#[test]
fn test_invalid_steps() {
    let pd = definition(btreemap! {});
    let compiler = Compiler::new();

    let mut zero_retry = task("t");
    if let StepKind::Task { retry, .. } = &mut zero_retry.kind {
        *retry = Some(RetryOptions { times: 0 });
    }

    let cases = vec![
        task(""),
        zero_retry,
        step(StepKind::Set { vars: Map::new() }),
        step(StepKind::Suspend { event: " ".to_string() }),
        step(StepKind::Throw { exception: json!(null) }),
        step(StepKind::Parallel { branches: vec![], out: vec![] }),
        step(StepKind::If {
            expression: "${x >}".to_string(),
            then: vec![],
            otherwise: None,
        }),
    ];

    for case in cases {
        let err = compiler.compile_step(&pd, &case).unwrap_err();
        assert!(
            matches!(err, CompileError::InvalidStep { .. }),
            "expected invalid step for {:?}, got {:?}",
            case.kind,
            err
        );
        assert_eq!(err.location(), Some(&Location::new(3, 5)));
    }
}

#[test]
fn test_nested_errors_propagate() {
    let pd = definition(btreemap! {
        "default".to_string() => vec![step(StepKind::Try {
            steps: vec![task("")],
            error: vec![],
        })],
    });
    let err = Compiler::new().compile_flow(&pd, "default").unwrap_err();
    assert!(matches!(err, CompileError::InvalidStep { step: "task", .. }));
}

#[test]
fn test_program_caches_flows() {
    let pd = definition(btreemap! {
        "default".to_string() => vec![task("log")],
        "other".to_string() => vec![task("echo")],
    });
    let mut program = Program::new(pd.clone());

    assert!(!program.is_compiled("default"));
    program.flow("default").unwrap();
    assert!(program.is_compiled("default"));
    assert!(!program.is_compiled("other"));

    program.compile_all().unwrap();
    assert!(program.is_compiled("other"));
    assert_eq!(program.fingerprint(), fingerprint(&pd));
}

#[test]
fn test_fingerprint_tracks_changes() {
    let a = definition(btreemap! { "default".to_string() => vec![task("log")] });
    let b = definition(btreemap! { "default".to_string() => vec![task("echo")] });

    assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
    assert_ne!(fingerprint(&a), fingerprint(&b));
    assert_eq!(fingerprint(&a).len(), 64);
}
