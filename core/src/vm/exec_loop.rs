//! Core execution loop
//!
//! `step()` advances one thread by exactly one command. Errors raised by a
//! command never escape the loop: they unwind the thread's frames to the
//! nearest handler, or fail the thread.
//!
//! ## Function Organization
//! 1. run_until_blocked() - Top-level driver (round-robin over runnable threads)
//! 2. step() - Pops and evaluates one command
//! 3. unwind() / finish_thread() / fail_thread() - Thread lifecycle

use tracing::{debug, info, warn};

use super::commands;
use super::context::Context;
use super::errors::{ErrorInfo, RuntimeError, LAST_ERROR_VAR};
use super::runtime::Runtime;
use super::state::State;
use super::types::{ThreadId, ThreadStatus};
use crate::compiler::Program;

/* ===================== Public API ===================== */

/// Run every runnable thread until none is left
///
/// Threads take turns one command at a time, so parallel branches interleave
/// deterministically. Returns the number of steps taken.
pub fn run_until_blocked(
    runtime: &Runtime,
    program: &mut Program,
    state: &mut State,
) -> Result<usize, RuntimeError> {
    let mut steps = 0;
    let mut last = None;
    while let Some(thread) = state.next_runnable(last) {
        step(runtime, program, state, thread)?;
        steps += 1;
        last = Some(thread);
    }
    Ok(steps)
}

/// Execute one step of a thread
///
/// 1. Raises an injected failure, if any
/// 2. Pops an exhausted frame, finishing the thread at its outermost frame
/// 3. Evaluates the frame's next command
/// 4. Applies a suspension requested during evaluation
pub fn step(
    runtime: &Runtime,
    program: &mut Program,
    state: &mut State,
    thread_id: ThreadId,
) -> Result<(), RuntimeError> {
    let thread = state
        .thread_mut(thread_id)
        .ok_or_else(|| RuntimeError::InvalidState(format!("thread {} does not exist", thread_id)))?;

    if let Some(failure) = thread.pending_failure.take() {
        unwind(state, thread_id, failure);
        return Ok(());
    }

    let Some(frame_id) = thread.current_frame() else {
        finish_thread(state, thread_id);
        return Ok(());
    };

    let command = state
        .frame_mut(frame_id)
        .ok_or_else(|| RuntimeError::InvalidState(format!("frame {} does not exist", frame_id)))?
        .pop();
    let Some(command) = command else {
        // The outermost frame is kept so a finished process still exposes its variables
        let depth = state.thread(thread_id).map(|t| t.frames.len()).unwrap_or(0);
        if depth > 1 {
            state.pop_frame(thread_id);
        } else {
            finish_thread(state, thread_id);
        }
        return Ok(());
    };

    debug!(thread = %thread_id, frame = %frame_id, command = command.kind(), "Step");

    let result = {
        let mut ctx = Context::new(runtime, program, state, thread_id);
        commands::eval(command, &mut ctx)
    };

    match result {
        Ok(()) => {
            let request = state
                .thread_mut(thread_id)
                .and_then(|t| t.suspend_request.take());
            if let Some(event) = request {
                info!(instance_id = %state.instance_id, thread = %thread_id, event = %event, "Thread suspended");
                apply_suspend(state, thread_id, event);
            }
        }
        Err(e) => {
            warn!(instance_id = %state.instance_id, thread = %thread_id, error = %e, "Command failed");
            if let Some(thread) = state.thread_mut(thread_id) {
                thread.suspend_request = None;
            }
            unwind(state, thread_id, e.to_error_info());
        }
    }

    Ok(())
}

fn apply_suspend(state: &mut State, thread_id: ThreadId, event: String) {
    if let Some(thread) = state.thread_mut(thread_id) {
        thread.status = ThreadStatus::Suspended;
        thread.event = Some(event);
    }
}

/* ===================== Control Flow ===================== */

/// Unwind a thread after an error
///
/// Cancels the thread's unfinished children, then pops frames until one has a
/// handler. That frame's pending commands are replaced by the handler, and the
/// error is exposed to it as `lastError`. With no handler the thread fails,
/// keeping its outermost frame.
pub(crate) fn unwind(state: &mut State, thread_id: ThreadId, error: ErrorInfo) {
    cancel_children(state, thread_id);
    if let Some(thread) = state.thread_mut(thread_id) {
        thread.status = ThreadStatus::Runnable;
        thread.event = None;
    }

    loop {
        let Some(frame_id) = state.peek_frame(thread_id) else {
            fail_thread(state, thread_id, error);
            return;
        };

        let outermost = state
            .thread(thread_id)
            .map(|t| t.frames.len() <= 1)
            .unwrap_or(true);

        if let Some(frame) = state.frame_mut(frame_id) {
            if let Some(handler) = frame.handler.take() {
                debug!(thread = %thread_id, frame = %frame_id, error = %error, "Error handled");
                frame.commands.clear();
                frame.push(handler);
                frame.locals.insert(LAST_ERROR_VAR.to_string(), error.to_value());
                return;
            }

            // Variables written before the failure stay readable
            if outermost {
                frame.commands.clear();
                fail_thread(state, thread_id, error);
                return;
            }
        }

        state.pop_frame(thread_id);
    }
}

fn finish_thread(state: &mut State, thread_id: ThreadId) {
    let Some(thread) = state.thread_mut(thread_id) else {
        return;
    };
    thread.status = ThreadStatus::Done;
    let parent = thread.parent;
    debug!(thread = %thread_id, "Thread finished");

    if let Some(parent) = parent {
        wake_parent(state, parent);
    }
}

fn fail_thread(state: &mut State, thread_id: ThreadId, error: ErrorInfo) {
    let Some(thread) = state.thread_mut(thread_id) else {
        return;
    };
    warn!(thread = %thread_id, error = %error, "Thread failed");
    thread.status = ThreadStatus::Failed;
    thread.error = Some(error);
    let parent = thread.parent;

    if let Some(parent) = parent {
        wake_parent(state, parent);
    }
}

/// Make a waiting parent runnable once all of its children are finished
fn wake_parent(state: &mut State, parent: ThreadId) {
    let Some(p) = state.thread(parent) else {
        return;
    };
    if p.status != ThreadStatus::Waiting {
        return;
    }

    let all_finished = p.children.iter().all(|c| {
        state
            .thread(*c)
            .map(|t| t.status.is_finished())
            .unwrap_or(true)
    });
    if all_finished {
        if let Some(p) = state.thread_mut(parent) {
            p.status = ThreadStatus::Runnable;
        }
    }
}

/// Remove every descendant of a thread, abandoning unfinished ones
fn cancel_children(state: &mut State, thread_id: ThreadId) {
    let children = match state.thread(thread_id) {
        Some(t) => t.children.clone(),
        None => return,
    };

    for child in children {
        cancel_children(state, child);
        if let Some(t) = state.thread(child) {
            if !t.status.is_finished() {
                debug!(thread = %child, "Cancelling child thread");
            }
        }
        state.remove_thread(child);
    }
}
