//! Task plugin interface
//!
//! Tasks are the process's side effects: named implementations that receive an
//! evaluated input map and a `Context`, and report a `TaskResult`. A task that
//! needs to wait for something external returns `TaskResult::suspend`; when the
//! event arrives the runtime calls `Task::resume` with the event payload.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::context::Context;
use crate::expr::EvaluationError;

/* ===================== TaskResult ===================== */

/// Outcome reported by a task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub ok: bool,
    /// Exit code of an external process, if the task ran one
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    /// Output values
    pub values: Map<String, JsonValue>,
    /// Event to suspend on instead of completing
    pub suspend: Option<String>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            exit_code: None,
            error: None,
            values: Map::new(),
            suspend: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::success()
        }
    }

    /// Result of an external process; success only for exit code 0
    pub fn exited(code: i32) -> Self {
        Self {
            ok: code == 0,
            exit_code: Some(code),
            ..Self::success()
        }
    }

    /// Suspend the calling thread until `event` is delivered
    pub fn suspend(event: impl Into<String>) -> Self {
        Self {
            suspend: Some(event.into()),
            ..Self::success()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn with_values(mut self, values: Map<String, JsonValue>) -> Self {
        self.values.extend(values);
        self
    }

    /// Message describing a failed result
    pub fn failure_message(&self, task: &str) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        match self.exit_code {
            Some(code) => format!("Process finished with exit code {}", code),
            None => format!("Task '{}' failed", task),
        }
    }
}

/* ===================== TaskError ===================== */

/// Error raised by a task implementation
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Task cannot resume on event '{0}'")]
    NotResumable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/* ===================== Task ===================== */

/// A named task implementation
pub trait Task: Send + Sync {
    fn execute(
        &self,
        ctx: &mut Context<'_>,
        input: Map<String, JsonValue>,
    ) -> Result<TaskResult, TaskError>;

    /// Continue after a suspension, with the payload delivered by `resume`
    fn resume(
        &self,
        _ctx: &mut Context<'_>,
        event: &str,
        _payload: Map<String, JsonValue>,
    ) -> Result<TaskResult, TaskError> {
        Err(TaskError::NotResumable(event.to_string()))
    }
}

impl<F> Task for F
where
    F: Fn(&mut Context<'_>, Map<String, JsonValue>) -> Result<TaskResult, TaskError> + Send + Sync,
{
    fn execute(
        &self,
        ctx: &mut Context<'_>,
        input: Map<String, JsonValue>,
    ) -> Result<TaskResult, TaskError> {
        self(ctx, input)
    }
}

/* ===================== Registry ===================== */

/// Task implementations by name
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tasks
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        super::stdlib::register(&mut registry);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, task: impl Task + 'static) {
        self.tasks.insert(name.into(), Arc::new(task));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
