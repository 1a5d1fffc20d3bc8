//! Test helpers for VM tests
//!
//! Definitions are written as JSON, compiled into a fresh `Program` and run
//! until the process completes, fails, or suspends.

use crate::compiler::Program;
use crate::model::ProcessDefinition;
use crate::vm::{Context, RunOutcome, Runtime, State, TaskError, TaskResult};
use serde_json::{Map, Value as JsonValue};

pub struct Run {
    pub program: Program,
    pub state: State,
    pub outcome: RunOutcome,
}

pub fn definition(source: JsonValue) -> ProcessDefinition {
    serde_json::from_value(source).expect("Invalid process definition")
}

/// Runtime with the built-in tasks
pub fn runtime() -> Runtime {
    Runtime::builder().with_stdlib().build()
}

/// Pin a closure to the task signature
pub fn task<F>(f: F) -> F
where
    F: Fn(&mut Context<'_>, Map<String, JsonValue>) -> Result<TaskResult, TaskError>
        + Send
        + Sync
        + 'static,
{
    f
}

pub fn run(runtime: &Runtime, source: JsonValue) -> Run {
    run_with(runtime, source, Map::new())
}

pub fn run_with(runtime: &Runtime, source: JsonValue, arguments: Map<String, JsonValue>) -> Run {
    let mut program = Program::new(definition(source));
    let mut state = runtime
        .prepare(&mut program, arguments)
        .expect("Prepare failed");
    let outcome = runtime
        .start(&mut program, &mut state)
        .expect("Start failed");
    Run {
        program,
        state,
        outcome,
    }
}

/// Serialize and deserialize a state, as a checkpoint would
pub fn round_trip(state: &State) -> State {
    let bytes = state.to_bytes().expect("State serialization failed");
    State::from_bytes(&bytes).expect("State deserialization failed")
}

/// Rebuild a program from its definition, as a resuming process would
pub fn reload(program: &Program) -> Program {
    Program::new(program.definition().clone())
}

/// Variables of the finished root flow
pub fn vars(state: &State) -> &Map<String, JsonValue> {
    state.root_variables().expect("Root frame missing")
}

pub fn obj(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => unreachable!("Expected an object, got {:?}", other),
    }
}
