//! Task-facing context
//!
//! The only view a task gets of the running process: variable access through
//! the current frame, expression evaluation, suspension, and on-the-fly
//! compilation. Privileged access to the raw state goes through `execution()`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use uuid::Uuid;

use super::runtime::Runtime;
use super::state::State;
use super::types::{Command, Frame, FrameId, ThreadId};
use crate::compiler::{CompileError, Program};
use crate::expr::{self, EvaluationError, Scope};
use crate::model::Step;

/* ===================== Context ===================== */

pub struct Context<'a> {
    pub(crate) runtime: &'a Runtime,
    pub(crate) program: &'a mut Program,
    pub(crate) state: &'a mut State,
    pub(crate) thread_id: ThreadId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        program: &'a mut Program,
        state: &'a mut State,
        thread_id: ThreadId,
    ) -> Self {
        Self {
            runtime,
            program,
            state,
            thread_id,
        }
    }

    pub fn working_directory(&self) -> &Path {
        self.runtime.working_dir()
    }

    pub fn process_instance_id(&self) -> Uuid {
        self.state.instance_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub(crate) fn current_frame(&self) -> Option<FrameId> {
        self.state.peek_frame(self.thread_id)
    }

    /// Variables visible from the current frame
    pub fn variables(&self) -> Variables<'_> {
        Variables {
            state: &*self.state,
            frame: self.current_frame(),
        }
    }

    /// Set a flow-wide variable (nearest root frame)
    pub fn set_variable(&mut self, name: impl Into<String>, value: JsonValue) {
        if let Some(frame) = self.current_frame() {
            let root = self.state.nearest_root(frame);
            self.state.put_local(root, name, value);
        }
    }

    /* ---------- evaluation ---------- */

    pub fn eval(&self, value: &JsonValue) -> Result<JsonValue, EvaluationError> {
        expr::eval_value(&self.variables(), value)
    }

    pub fn eval_as<T: DeserializeOwned>(&self, value: &JsonValue) -> Result<T, EvaluationError> {
        expr::eval_as(&self.variables(), value)
    }

    pub fn eval_map(
        &self,
        input: &Map<String, JsonValue>,
    ) -> Result<Map<String, JsonValue>, EvaluationError> {
        expr::eval_as_map(&self.variables(), input)
    }

    pub fn eval_condition(&self, source: &str) -> Result<bool, EvaluationError> {
        expr::eval_condition(&self.variables(), source)
    }

    /* ---------- control ---------- */

    /// Suspend the current thread on `event` once the running command finishes
    pub fn suspend(&mut self, event: impl Into<String>) {
        if let Some(thread) = self.state.thread_mut(self.thread_id) {
            thread.suspend_request = Some(event.into());
        }
    }

    /// Compile a step with the process's compiler
    pub fn compile(&self, step: &Step) -> Result<Command, CompileError> {
        self.program.compile_step(step)
    }

    /// Privileged access to the execution state
    pub fn execution(&mut self) -> Execution<'_> {
        Execution {
            state: &mut *self.state,
            thread_id: self.thread_id,
        }
    }
}

/* ===================== Variables ===================== */

/// Read-only variable view through a frame's parent chain
pub struct Variables<'a> {
    state: &'a State,
    frame: Option<FrameId>,
}

impl Variables<'_> {
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.lookup(name)
    }

    /// Snapshot of every visible variable
    pub fn to_map(&self) -> Map<String, JsonValue> {
        self.frame
            .map(|f| self.state.visible_locals(f))
            .unwrap_or_default()
    }
}

impl Scope for Variables<'_> {
    fn lookup(&self, name: &str) -> Option<&JsonValue> {
        self.state.get_local(self.frame?, name)
    }
}

/* ===================== Execution ===================== */

/// Raw state access for tasks that manipulate frames
pub struct Execution<'a> {
    state: &'a mut State,
    thread_id: ThreadId,
}

impl Execution<'_> {
    pub fn state(&self) -> &State {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut *self.state
    }

    pub fn current_thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Innermost frame of the current thread
    pub fn peek_frame(&self) -> Option<&Frame> {
        self.state
            .peek_frame(self.thread_id)
            .and_then(|id| self.state.frame(id))
    }

    /// Schedule a command to run next on the current thread
    pub fn push_command(&mut self, command: Command) -> bool {
        let Some(id) = self.state.peek_frame(self.thread_id) else {
            return false;
        };
        match self.state.frame_mut(id) {
            Some(frame) => {
                frame.push(command);
                true
            }
            None => false,
        }
    }
}
