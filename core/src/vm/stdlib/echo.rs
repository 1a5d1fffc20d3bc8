//! echo - return the input as the task output

use serde_json::{Map, Value as JsonValue};

use crate::vm::context::Context;
use crate::vm::task::{Task, TaskError, TaskResult};

pub struct EchoTask;

impl Task for EchoTask {
    fn execute(
        &self,
        _ctx: &mut Context<'_>,
        input: Map<String, JsonValue>,
    ) -> Result<TaskResult, TaskError> {
        Ok(TaskResult::success().with_values(input))
    }
}
