//! Command evaluation
//!
//! One function per command kind. Each runs against the current thread's
//! innermost frame and either schedules more work (pushing commands or frames)
//! or returns an error that the execution loop unwinds.

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use super::context::Context;
use super::errors::RuntimeError;
use super::task::{TaskError, TaskResult};
use super::types::{Command, Frame, FrameId, ThreadId, ThreadStatus};
use crate::compiler::CompileError;
use crate::expr::eval::render;
use crate::model::Location;

/// Local variable holding the current retry attempt (0 for the first run)
pub const RETRY_ATTEMPT_VAR: &str = "__retry_attemptNo";

type CommandResult = Result<(), RuntimeError>;

/// Evaluate one command on the context's thread
pub(crate) fn eval(command: Command, ctx: &mut Context<'_>) -> CommandResult {
    match command {
        Command::Block { commands } => eval_block(ctx, commands),
        Command::TaskCall {
            location,
            name,
            input,
            out,
            ignore_errors,
        } => eval_task_call(ctx, location, name, input, out, ignore_errors),
        Command::TaskResume {
            location,
            name,
            event,
            out,
            ignore_errors,
        } => eval_task_resume(ctx, location, name, event, out, ignore_errors),
        Command::Throw {
            location,
            exception,
        } => eval_throw(ctx, location, exception),
        Command::SetVariables { location, vars } => eval_set_variables(ctx, location, vars),
        Command::Conditional {
            location,
            expression,
            then,
            otherwise,
        } => eval_conditional(ctx, location, expression, *then, otherwise.map(|o| *o)),
        Command::Suspend { event, .. } => {
            ctx.suspend(event);
            Ok(())
        }
        Command::Call {
            location,
            flow,
            input,
            out,
        } => eval_call(ctx, location, flow, input, out),
        Command::CopyOutputs { names } => eval_copy_outputs(ctx, names),
        Command::Try {
            body, handler, ..
        } => eval_try(ctx, *body, *handler),
        Command::Retry {
            location,
            body,
            times,
            attempt,
        } => eval_retry(ctx, location, *body, times, attempt),
        Command::Parallel {
            location,
            branches,
            out,
        } => eval_parallel(ctx, location, branches, out),
        Command::Join {
            location,
            threads,
            out,
        } => eval_join(ctx, location, threads, out),
    }
}

/* ===================== Helpers ===================== */

fn current_frame(ctx: &Context<'_>) -> Result<FrameId, RuntimeError> {
    ctx.current_frame().ok_or_else(|| {
        RuntimeError::InvalidState(format!("thread {} has no frames", ctx.thread_id))
    })
}

fn frame_mut<'c>(ctx: &'c mut Context<'_>, id: FrameId) -> Result<&'c mut Frame, RuntimeError> {
    ctx.state
        .frame_mut(id)
        .ok_or_else(|| RuntimeError::InvalidState(format!("frame {} does not exist", id)))
}

fn push_frame(ctx: &mut Context<'_>, frame: Frame) -> CommandResult {
    let thread = ctx.thread_id;
    ctx.state
        .push_frame(thread, frame)
        .map(|_| ())
        .ok_or_else(|| RuntimeError::InvalidState(format!("thread {} does not exist", thread)))
}

/// Schedule a command on the current frame
fn schedule(ctx: &mut Context<'_>, command: Command) -> CommandResult {
    let id = current_frame(ctx)?;
    frame_mut(ctx, id)?.push(command);
    Ok(())
}

/* ===================== Simple Commands ===================== */

fn eval_block(ctx: &mut Context<'_>, commands: Vec<Command>) -> CommandResult {
    let id = current_frame(ctx)?;
    frame_mut(ctx, id)?.push_all(commands);
    Ok(())
}

fn eval_set_variables(
    ctx: &mut Context<'_>,
    location: Location,
    vars: Map<String, JsonValue>,
) -> CommandResult {
    let values = ctx.eval_map(&vars).map_err(|e| e.at(&location))?;
    let id = current_frame(ctx)?;
    ctx.state.put_root_locals(id, values);
    Ok(())
}

fn eval_throw(ctx: &mut Context<'_>, location: Location, exception: JsonValue) -> CommandResult {
    let payload = ctx.eval(&exception).map_err(|e| e.at(&location))?;
    let message = match &payload {
        JsonValue::Object(map) => map.get("message").map(render),
        _ => None,
    }
    .unwrap_or_else(|| render(&payload));

    Err(RuntimeError::Thrown {
        message,
        payload,
        location,
    })
}

fn eval_conditional(
    ctx: &mut Context<'_>,
    location: Location,
    expression: String,
    then: Command,
    otherwise: Option<Command>,
) -> CommandResult {
    let matched = ctx
        .eval_condition(&expression)
        .map_err(|e| e.at(&location))?;
    debug!(expression = %expression, matched, "Evaluated condition");

    let branch = if matched { Some(then) } else { otherwise };
    let Some(branch) = branch else {
        return Ok(());
    };

    let parent = current_frame(ctx)?;
    let mut frame = Frame::nested(parent);
    frame.push(branch);
    push_frame(ctx, frame)
}

/* ===================== Error Handling ===================== */

fn eval_try(ctx: &mut Context<'_>, body: Command, handler: Command) -> CommandResult {
    let parent = current_frame(ctx)?;
    let mut frame = Frame::nested(parent).with_handler(handler);
    frame.push(body);
    push_frame(ctx, frame)
}

fn eval_retry(
    ctx: &mut Context<'_>,
    location: Location,
    body: Command,
    times: u32,
    attempt: u32,
) -> CommandResult {
    if attempt > 0 {
        warn!(
            instance_id = %ctx.process_instance_id(),
            thread = %ctx.thread_id,
            attempt,
            times,
            "Retrying after failure ({})",
            location
        );
    }

    let parent = current_frame(ctx)?;
    let mut locals = Map::new();
    locals.insert(RETRY_ATTEMPT_VAR.to_string(), JsonValue::from(attempt));

    let mut frame = Frame::nested(parent).with_locals(locals);
    if attempt < times {
        frame = frame.with_handler(Command::Retry {
            location,
            body: Box::new(body.clone()),
            times,
            attempt: attempt + 1,
        });
    }
    frame.push(body);
    push_frame(ctx, frame)
}

/* ===================== Tasks ===================== */

fn eval_task_call(
    ctx: &mut Context<'_>,
    location: Location,
    name: String,
    input: Map<String, JsonValue>,
    out: Option<String>,
    ignore_errors: bool,
) -> CommandResult {
    let task = ctx
        .runtime
        .tasks()
        .get(&name)
        .ok_or_else(|| RuntimeError::TaskNotFound {
            name: name.clone(),
            location: location.clone(),
        })?;

    let input = ctx.eval_map(&input).map_err(|e| e.at(&location))?;
    debug!(task = %name, thread = %ctx.thread_id, "Calling task");

    let result = task.execute(ctx, input);
    complete_task(ctx, location, name, out, ignore_errors, result)
}

fn eval_task_resume(
    ctx: &mut Context<'_>,
    location: Location,
    name: String,
    event: String,
    out: Option<String>,
    ignore_errors: bool,
) -> CommandResult {
    let task = ctx
        .runtime
        .tasks()
        .get(&name)
        .ok_or_else(|| RuntimeError::TaskNotFound {
            name: name.clone(),
            location: location.clone(),
        })?;

    let payload = ctx
        .state
        .thread_mut(ctx.thread_id)
        .and_then(|t| t.resume_payload.take())
        .unwrap_or_default();
    debug!(task = %name, event = %event, thread = %ctx.thread_id, "Resuming task");

    let result = task.resume(ctx, &event, payload);
    complete_task(ctx, location, name, out, ignore_errors, result)
}

/// Apply a task's result: suspend, store outputs, or fail
fn complete_task(
    ctx: &mut Context<'_>,
    location: Location,
    name: String,
    out: Option<String>,
    ignore_errors: bool,
    result: Result<TaskResult, TaskError>,
) -> CommandResult {
    let result = match result {
        Ok(result) => result,
        Err(TaskError::Evaluation(e)) => return Err(e.at(&location).into()),
        Err(e) => TaskResult::failure(e.to_string()),
    };

    if let Some(event) = result.suspend {
        schedule(
            ctx,
            Command::TaskResume {
                location,
                name,
                event: event.clone(),
                out,
                ignore_errors,
            },
        )?;
        ctx.suspend(event);
        return Ok(());
    }

    if result.ok {
        match out {
            Some(var) => ctx.set_variable(var, JsonValue::Object(result.values)),
            None => {
                let id = current_frame(ctx)?;
                ctx.state.put_root_locals(id, result.values);
            }
        }
        return Ok(());
    }

    let message = result.failure_message(&name);
    if ignore_errors {
        warn!(task = %name, error = %message, "Task failed, error ignored");
        if let Some(var) = out {
            let mut values = result.values;
            values.insert("ok".to_string(), JsonValue::Bool(false));
            values.insert("error".to_string(), JsonValue::String(message));
            if let Some(code) = result.exit_code {
                values.insert("exitCode".to_string(), JsonValue::from(code));
            }
            ctx.set_variable(var, JsonValue::Object(values));
        }
        return Ok(());
    }

    Err(RuntimeError::TaskFailure {
        task: name,
        message,
        exit_code: result.exit_code,
        location,
    })
}

/* ===================== Flow Calls ===================== */

fn eval_call(
    ctx: &mut Context<'_>,
    location: Location,
    flow: String,
    input: Map<String, JsonValue>,
    out: Vec<String>,
) -> CommandResult {
    let flow_name = render(&ctx.eval(&JsonValue::String(flow)).map_err(|e| e.at(&location))?);
    let input = ctx.eval_map(&input).map_err(|e| e.at(&location))?;

    let body = match ctx.program.flow(&flow_name) {
        Ok(body) => body.clone(),
        Err(CompileError::FlowNotFound { name, .. }) => {
            return Err(CompileError::FlowNotFound {
                name,
                location: Some(location),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };
    debug!(flow = %flow_name, thread = %ctx.thread_id, "Calling flow");

    let caller = current_frame(ctx)?;
    let mut frame = Frame::root(Some(caller)).with_locals(input);
    frame.push_all([body, Command::CopyOutputs { names: out }]);
    push_frame(ctx, frame)
}

fn eval_copy_outputs(ctx: &mut Context<'_>, names: Vec<String>) -> CommandResult {
    if names.is_empty() {
        return Ok(());
    }

    let id = current_frame(ctx)?;
    let frame = frame_mut(ctx, id)?;
    let Some(parent) = frame.parent else {
        return Ok(());
    };

    let mut values = Map::new();
    for name in names {
        match frame.locals.get(&name) {
            Some(value) => {
                values.insert(name, value.clone());
            }
            None => debug!(variable = %name, "Output variable was never set"),
        }
    }
    ctx.state.put_root_locals(parent, values);
    Ok(())
}

/* ===================== Parallel ===================== */

fn eval_parallel(
    ctx: &mut Context<'_>,
    location: Location,
    branches: Vec<Command>,
    out: Vec<String>,
) -> CommandResult {
    let spawning = current_frame(ctx)?;
    let parent = ctx.thread_id;

    let mut threads = Vec::with_capacity(branches.len());
    for branch in branches {
        let child = ctx.state.spawn_thread(parent);
        let mut frame = Frame::root(Some(spawning));
        frame.push(branch);
        ctx.state
            .push_frame(child, frame)
            .ok_or_else(|| RuntimeError::InvalidState(format!("thread {} does not exist", child)))?;
        threads.push(child);
    }
    debug!(thread = %parent, children = threads.len(), "Forked parallel branches");

    schedule(
        ctx,
        Command::Join {
            location,
            threads,
            out,
        },
    )?;
    set_status(ctx, ThreadStatus::Waiting);
    Ok(())
}

/// Branch outputs are copied only once every branch has finished, so a branch
/// never observes a sibling's variables.
fn eval_join(
    ctx: &mut Context<'_>,
    location: Location,
    threads: Vec<ThreadId>,
    out: Vec<String>,
) -> CommandResult {
    let pending = threads.iter().any(|id| {
        ctx.state
            .thread(*id)
            .map(|t| !t.status.is_finished())
            .unwrap_or(false)
    });
    if pending {
        schedule(
            ctx,
            Command::Join {
                location,
                threads,
                out,
            },
        )?;
        set_status(ctx, ThreadStatus::Waiting);
        return Ok(());
    }

    let failure = threads.iter().find_map(|id| {
        ctx.state
            .thread(*id)
            .and_then(|t| t.error.clone())
            .map(|error| (*id, error))
    });

    if failure.is_none() && !out.is_empty() {
        let target = current_frame(ctx)?;
        for id in &threads {
            let values = branch_outputs(ctx, *id, &out);
            ctx.state.put_root_locals(target, values);
        }
    }

    for id in &threads {
        ctx.state.remove_thread(*id);
    }

    match failure {
        Some((thread, error)) => Err(RuntimeError::BranchFailed { thread, error }),
        None => Ok(()),
    }
}

/// Named variables of a finished branch's outermost frame
fn branch_outputs(ctx: &Context<'_>, thread: ThreadId, names: &[String]) -> Map<String, JsonValue> {
    let Some(frame) = ctx
        .state
        .thread(thread)
        .and_then(|t| t.frames.first().copied())
        .and_then(|id| ctx.state.frame(id))
    else {
        return Map::new();
    };

    names
        .iter()
        .filter_map(|name| frame.get_local(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

fn set_status(ctx: &mut Context<'_>, status: ThreadStatus) {
    if let Some(thread) = ctx.state.thread_mut(ctx.thread_id) {
        thread.status = status;
    }
}
