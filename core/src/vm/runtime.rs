//! Runtime
//!
//! Owns the task registry and drives states through the execution loop. The
//! runtime itself is stateless between calls: everything about a process lives
//! in `State`, so one runtime can run many processes, and a process suspended
//! by one runtime can be resumed by another.

use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkpoint::CheckpointError;
use super::errors::{ErrorInfo, RuntimeError};
use super::exec_loop;
use super::state::State;
use super::task::{Task, TaskRegistry};
use super::types::{Command, Frame, ThreadId, ThreadStatus};
use crate::compiler::Program;

/* ===================== Outcome ===================== */

/// Where a process stopped
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The root thread ran to completion
    Done,
    /// No thread can continue until one of these events is delivered
    Suspended { events: Vec<String> },
    /// The root thread failed with an unhandled error
    Failed { error: ErrorInfo },
}

/* ===================== Builder ===================== */

/// Builder for `Runtime`
///
/// ```
/// use tempo_core::vm::Runtime;
///
/// let runtime = Runtime::builder()
///     .with_stdlib()
///     .working_dir("/tmp")
///     .build();
/// assert!(runtime.tasks().contains("log"));
/// ```
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    tasks: TaskRegistry,
    working_dir: Option<PathBuf>,
}

impl RuntimeBuilder {
    /// Register the built-in tasks
    pub fn with_stdlib(mut self) -> Self {
        super::stdlib::register(&mut self.tasks);
        self
    }

    pub fn task(mut self, name: impl Into<String>, task: impl Task + 'static) -> Self {
        self.tasks.register(name, task);
        self
    }

    pub fn tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            tasks: self.tasks,
            working_dir: self.working_dir.unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/* ===================== Runtime ===================== */

#[derive(Debug)]
pub struct Runtime {
    tasks: TaskRegistry,
    working_dir: PathBuf,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Create the initial state for the definition's entry point
    ///
    /// Definition arguments are merged with `arguments`, the latter winning.
    pub fn prepare(
        &self,
        program: &mut Program,
        arguments: Map<String, JsonValue>,
    ) -> Result<State, RuntimeError> {
        let entry_point = program.definition().configuration.entry_point.clone();
        let mut locals = program.definition().configuration.arguments.clone();
        locals.extend(arguments);
        self.prepare_flow(program, &entry_point, locals)
    }

    /// Create the initial state for a named flow
    pub fn prepare_flow(
        &self,
        program: &mut Program,
        flow: &str,
        arguments: Map<String, JsonValue>,
    ) -> Result<State, RuntimeError> {
        let body = program.flow(flow)?.clone();

        let mut state = State::new(Uuid::new_v4(), program.fingerprint());
        let mut frame = Frame::root(None).with_locals(arguments);
        frame.push(body);
        state
            .push_frame(ThreadId::ROOT, frame)
            .ok_or_else(|| RuntimeError::InvalidState("root thread is missing".to_string()))?;

        info!(instance_id = %state.instance_id, flow = %flow, "Process prepared");
        Ok(state)
    }

    /// Run a state until it completes, fails, or suspends
    pub fn start(&self, program: &mut Program, state: &mut State) -> Result<RunOutcome, RuntimeError> {
        check_definition(program, state)?;

        let steps = exec_loop::run_until_blocked(self, program, state)?;
        let outcome = outcome(state)?;

        match &outcome {
            RunOutcome::Done => info!(instance_id = %state.instance_id, steps, "Process finished"),
            RunOutcome::Suspended { events } => {
                info!(instance_id = %state.instance_id, steps, events = ?events, "Process suspended")
            }
            RunOutcome::Failed { error } => {
                warn!(instance_id = %state.instance_id, steps, error = %error, "Process failed")
            }
        }
        Ok(outcome)
    }

    /// Deliver an event to the threads suspended on it, then continue
    ///
    /// A task that suspended receives `payload` through `Task::resume`; for a
    /// plain suspension the payload is merged into the thread's flow variables.
    pub fn resume(
        &self,
        program: &mut Program,
        state: &mut State,
        event: &str,
        payload: Map<String, JsonValue>,
    ) -> Result<RunOutcome, RuntimeError> {
        check_definition(program, state)?;

        let waiting: Vec<ThreadId> = state
            .threads()
            .filter(|t| t.status == ThreadStatus::Suspended && t.event.as_deref() == Some(event))
            .map(|t| t.id)
            .collect();
        if waiting.is_empty() {
            return Err(RuntimeError::EventNotFound(event.to_string()));
        }

        for thread_id in waiting {
            deliver(state, thread_id, payload.clone());
            debug!(instance_id = %state.instance_id, thread = %thread_id, event = %event, "Thread resumed");
        }

        self.start(program, state)
    }

    /// Fail the process from outside
    ///
    /// The root thread unwinds with a `Cancelled` error on its next step, so
    /// error handlers still run.
    pub fn cancel(
        &self,
        program: &mut Program,
        state: &mut State,
        reason: &str,
    ) -> Result<RunOutcome, RuntimeError> {
        self.inject_failure(program, state, ThreadId::ROOT, ErrorInfo::cancelled(reason))
    }

    /// Raise `error` in a thread, then continue
    pub fn inject_failure(
        &self,
        program: &mut Program,
        state: &mut State,
        thread: ThreadId,
        error: ErrorInfo,
    ) -> Result<RunOutcome, RuntimeError> {
        if !state.inject_failure(thread, error) {
            return Err(RuntimeError::InvalidState(format!(
                "thread {} is not running",
                thread
            )));
        }
        self.start(program, state)
    }
}

/* ===================== Helpers ===================== */

fn check_definition(program: &Program, state: &State) -> Result<(), RuntimeError> {
    if program.fingerprint() != state.definition_hash {
        return Err(CheckpointError::DefinitionMismatch {
            expected: state.definition_hash.clone(),
            actual: program.fingerprint().to_string(),
        }
        .into());
    }
    Ok(())
}

fn deliver(state: &mut State, thread_id: ThreadId, payload: Map<String, JsonValue>) {
    let next_is_task = state
        .peek_frame(thread_id)
        .and_then(|id| state.frame(id))
        .and_then(|frame| frame.peek())
        .map(|command| matches!(command, Command::TaskResume { .. }))
        .unwrap_or(false);

    if next_is_task {
        if let Some(thread) = state.thread_mut(thread_id) {
            thread.resume_payload = Some(payload);
        }
    } else if let Some(frame) = state.peek_frame(thread_id) {
        state.put_root_locals(frame, payload);
    }

    if let Some(thread) = state.thread_mut(thread_id) {
        thread.status = ThreadStatus::Runnable;
        thread.event = None;
    }
}

fn outcome(state: &State) -> Result<RunOutcome, RuntimeError> {
    let root = state
        .root_thread()
        .ok_or_else(|| RuntimeError::InvalidState("root thread is missing".to_string()))?;

    match root.status {
        ThreadStatus::Done => Ok(RunOutcome::Done),
        ThreadStatus::Failed => Ok(RunOutcome::Failed {
            error: root
                .error
                .clone()
                .unwrap_or_else(|| ErrorInfo::new(super::errors::INTERNAL, "unknown error")),
        }),
        _ => {
            let events = state.suspended_events();
            if events.is_empty() {
                return Err(RuntimeError::InvalidState(
                    "no thread can make progress".to_string(),
                ));
            }
            Ok(RunOutcome::Suspended { events })
        }
    }
}
