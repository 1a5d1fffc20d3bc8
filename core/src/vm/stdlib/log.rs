//! log - write a message to the process log
//!
//! Input: `msg` (any value, rendered as text) and optional `level`
//! (`debug`, `info`, `warn` or `error`; default `info`).

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::expr::eval::render;
use crate::vm::context::Context;
use crate::vm::task::{Task, TaskError, TaskResult};

pub struct LogTask;

impl Task for LogTask {
    fn execute(
        &self,
        ctx: &mut Context<'_>,
        input: Map<String, JsonValue>,
    ) -> Result<TaskResult, TaskError> {
        let msg = input.get("msg").map(render).unwrap_or_default();
        let instance = ctx.process_instance_id();
        let thread = ctx.thread_id();

        match input.get("level").and_then(|l| l.as_str()).unwrap_or("info") {
            "debug" => debug!(instance_id = %instance, thread = %thread, "{}", msg),
            "info" => info!(instance_id = %instance, thread = %thread, "{}", msg),
            "warn" => warn!(instance_id = %instance, thread = %thread, "{}", msg),
            "error" => error!(instance_id = %instance, thread = %thread, "{}", msg),
            other => {
                return Err(TaskError::failed(format!(
                    "Unknown log level '{}', expected one of debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(TaskResult::success())
    }
}
