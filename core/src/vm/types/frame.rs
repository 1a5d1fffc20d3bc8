//! Execution frames
//!
//! Frames live in an arena owned by `State` and reference each other by
//! `FrameId`, which keeps parent chains serializable and free of ownership
//! cycles.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::command::Command;

/// Index of a frame in the state's frame arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub usize);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// Scope of one flow invocation (or parallel branch); target of flow-wide writes
    Root,
    /// Scope of a nested construct (branch, try body, retry attempt)
    Nested,
}

/// One lexical/call scope on a thread's stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub parent: Option<FrameId>,
    pub locals: Map<String, JsonValue>,
    /// Pending commands, next to run last
    pub commands: Vec<Command>,
    /// Error handler installed by the command that created this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<Command>,
}

impl Frame {
    pub fn root(parent: Option<FrameId>) -> Self {
        Self::new(FrameKind::Root, parent)
    }

    pub fn nested(parent: FrameId) -> Self {
        Self::new(FrameKind::Nested, Some(parent))
    }

    fn new(kind: FrameKind, parent: Option<FrameId>) -> Self {
        Self {
            kind,
            parent,
            locals: Map::new(),
            commands: Vec::new(),
            handler: None,
        }
    }

    pub fn with_locals(mut self, locals: Map<String, JsonValue>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_handler(mut self, handler: Command) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Schedule a command to run next
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Schedule commands to run in the given order
    pub fn push_all(&mut self, commands: impl IntoIterator<Item = Command>) {
        let mut commands: Vec<Command> = commands.into_iter().collect();
        commands.reverse();
        self.commands.extend(commands);
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.commands.pop()
    }

    /// Next command to run
    pub fn peek(&self) -> Option<&Command> {
        self.commands.last()
    }

    pub fn get_local(&self, key: &str) -> Option<&JsonValue> {
        self.locals.get(key)
    }

    pub fn is_root(&self) -> bool {
        self.kind == FrameKind::Root
    }
}
