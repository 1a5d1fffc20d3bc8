//! Runtime errors
//!
//! `RuntimeError` is what command evaluation returns. Before an error unwinds a
//! thread it is converted into an `ErrorInfo`, the serializable record stored in
//! frames (`lastError`) and on failed threads.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::checkpoint::CheckpointError;
use super::types::ThreadId;
use crate::compiler::CompileError;
use crate::expr::EvaluationError;
use crate::model::Location;

/* ===================== Error Codes ===================== */

pub const EVALUATION_ERROR: &str = "EvaluationError";
pub const TASK_FAILURE: &str = "TaskFailure";
pub const TASK_NOT_FOUND: &str = "TaskNotFound";
pub const THROWN: &str = "Thrown";
pub const COMPILE_ERROR: &str = "CompileError";
pub const BRANCH_FAILED: &str = "BranchFailed";
pub const CANCELLED: &str = "Cancelled";
pub const INTERNAL: &str = "InternalError";

/// Local variable holding the error seen by an error handler
pub const LAST_ERROR_VAR: &str = "lastError";

/* ===================== ErrorInfo ===================== */

/// Serializable description of an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Thrown exception value, when the error came from a throw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location: None,
            payload: None,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(CANCELLED, reason)
    }

    pub fn at(mut self, location: Option<&Location>) -> Self {
        self.location = location.cloned();
        self
    }

    /// Value exposed to expressions as `lastError`
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

/* ===================== RuntimeError ===================== */

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("{message}")]
    TaskFailure {
        task: String,
        message: String,
        exit_code: Option<i32>,
        location: Location,
    },

    #[error("Task not found: {name}")]
    TaskNotFound { name: String, location: Location },

    #[error("{message}")]
    Thrown {
        message: String,
        payload: JsonValue,
        location: Location,
    },

    #[error("Parallel branch (thread {thread}) failed: {}", error.message)]
    BranchFailed { thread: ThreadId, error: ErrorInfo },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("No thread is suspended on event '{0}'")]
    EventNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RuntimeError {
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::Compile(_) => COMPILE_ERROR,
            RuntimeError::Evaluation(_) => EVALUATION_ERROR,
            RuntimeError::TaskFailure { .. } => TASK_FAILURE,
            RuntimeError::TaskNotFound { .. } => TASK_NOT_FOUND,
            RuntimeError::Thrown { .. } => THROWN,
            RuntimeError::BranchFailed { .. } => BRANCH_FAILED,
            RuntimeError::Checkpoint(_)
            | RuntimeError::EventNotFound(_)
            | RuntimeError::InvalidState(_) => INTERNAL,
        }
    }

    fn location(&self) -> Option<&Location> {
        match self {
            RuntimeError::Compile(e) => e.location(),
            RuntimeError::Evaluation(e) => e.location.as_ref(),
            RuntimeError::TaskFailure { location, .. }
            | RuntimeError::TaskNotFound { location, .. }
            | RuntimeError::Thrown { location, .. } => Some(location),
            RuntimeError::BranchFailed { error, .. } => error.location.as_ref(),
            _ => None,
        }
    }

    /// Convert into the record used for unwinding
    pub fn to_error_info(&self) -> ErrorInfo {
        let payload = match self {
            RuntimeError::Thrown { payload, .. } => Some(payload.clone()),
            RuntimeError::TaskFailure {
                exit_code: Some(code),
                ..
            } => Some(serde_json::json!({ "exitCode": code })),
            _ => None,
        };

        ErrorInfo {
            code: self.code().to_string(),
            message: self.to_string(),
            location: self.location().cloned(),
            payload,
        }
    }
}
