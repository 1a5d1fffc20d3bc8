//! Execution threads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::frame::FrameId;
use crate::vm::errors::ErrorInfo;

/// Thread identifier, unique within one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// The initial thread of every process
    pub const ROOT: ThreadId = ThreadId(0);
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreadStatus {
    Runnable,
    /// Blocked until all child threads finish
    Waiting,
    Suspended,
    Done,
    Failed,
}

impl ThreadStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, ThreadStatus::Done | ThreadStatus::Failed)
    }
}

/// One independent line of execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Thread that forked this one
    pub parent: Option<ThreadId>,
    /// Frame stack, innermost last
    pub frames: Vec<FrameId>,
    pub status: ThreadStatus,
    /// Forked threads not yet joined
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ThreadId>,
    /// Event the thread is suspended on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Terminal error of a failed thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Externally injected failure, raised on the next step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_failure: Option<ErrorInfo>,
    /// Suspension requested by the command being evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_request: Option<String>,
    /// Payload delivered with the resume event, for a pending task resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_payload: Option<Map<String, JsonValue>>,
}

impl Thread {
    pub fn new(id: ThreadId, parent: Option<ThreadId>) -> Self {
        Self {
            id,
            parent,
            frames: Vec::new(),
            status: ThreadStatus::Runnable,
            children: Vec::new(),
            event: None,
            error: None,
            pending_failure: None,
            suspend_request: None,
            resume_payload: None,
        }
    }

    /// Innermost frame
    pub fn current_frame(&self) -> Option<FrameId> {
        self.frames.last().copied()
    }
}
