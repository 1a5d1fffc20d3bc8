//! Compiled command tree
//!
//! A closed set of executable node kinds. Commands are plain data: they are
//! stored in frames as pending work and serialized with the rest of the state,
//! so a suspended process resumes from exactly the next pending command.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::thread::ThreadId;
use crate::model::Location;

/// Executable command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Command {
    /// Sequence of commands, evaluated in order
    Block { commands: Vec<Command> },

    /// Invoke a named task
    TaskCall {
        location: Location,
        name: String,
        input: Map<String, JsonValue>,
        out: Option<String>,
        ignore_errors: bool,
    },

    /// Complete a task that suspended, once its event arrives
    TaskResume {
        location: Location,
        name: String,
        event: String,
        out: Option<String>,
        ignore_errors: bool,
    },

    /// Raise an exception
    Throw {
        location: Location,
        exception: JsonValue,
    },

    /// Merge variables into the nearest root frame
    SetVariables {
        location: Location,
        vars: Map<String, JsonValue>,
    },

    Conditional {
        location: Location,
        expression: String,
        then: Box<Command>,
        otherwise: Option<Box<Command>>,
    },

    /// Stop the thread until the named event is delivered
    Suspend { location: Location, event: String },

    /// Invoke another flow in a new root frame
    Call {
        location: Location,
        flow: String,
        input: Map<String, JsonValue>,
        out: Vec<String>,
    },

    /// Copy variables of the finishing root frame into the caller's scope
    CopyOutputs { names: Vec<String> },

    /// Run `body` with `handler` as its error handler
    Try {
        location: Location,
        body: Box<Command>,
        handler: Box<Command>,
    },

    /// Run `body`, re-running it after a failure until `times` retries are spent
    Retry {
        location: Location,
        body: Box<Command>,
        times: u32,
        attempt: u32,
    },

    /// Fork one thread per branch, then join them
    Parallel {
        location: Location,
        branches: Vec<Command>,
        out: Vec<String>,
    },

    /// Wait for forked threads, then collect their outputs or surface their failures
    Join {
        location: Location,
        threads: Vec<ThreadId>,
        out: Vec<String>,
    },
}

impl Command {
    /// Variant name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Block { .. } => "Block",
            Command::TaskCall { .. } => "TaskCall",
            Command::TaskResume { .. } => "TaskResume",
            Command::Throw { .. } => "Throw",
            Command::SetVariables { .. } => "SetVariables",
            Command::Conditional { .. } => "Conditional",
            Command::Suspend { .. } => "Suspend",
            Command::Call { .. } => "Call",
            Command::CopyOutputs { .. } => "CopyOutputs",
            Command::Try { .. } => "Try",
            Command::Retry { .. } => "Retry",
            Command::Parallel { .. } => "Parallel",
            Command::Join { .. } => "Join",
        }
    }

    /// Source location, for commands compiled from a step
    pub fn location(&self) -> Option<&Location> {
        match self {
            Command::Block { .. } | Command::CopyOutputs { .. } => None,
            Command::TaskCall { location, .. }
            | Command::TaskResume { location, .. }
            | Command::Throw { location, .. }
            | Command::SetVariables { location, .. }
            | Command::Conditional { location, .. }
            | Command::Suspend { location, .. }
            | Command::Call { location, .. }
            | Command::Try { location, .. }
            | Command::Retry { location, .. }
            | Command::Parallel { location, .. }
            | Command::Join { location, .. } => Some(location),
        }
    }
}
