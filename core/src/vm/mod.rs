//! # VM - Suspendable, Serializable Process Executor
//!
//! ## Core Principles
//!
//! 1. **Stack-driven execution**: pending work lives in frames as compiled
//!    commands, never on the Rust call stack
//! 2. **Command-level steps**: a step pops and evaluates exactly one command
//! 3. **Centralized unwinding**: errors become `ErrorInfo` and unwind to the
//!    nearest frame with a handler
//! 4. **Plain-data state**: `State` owns frames and threads by index, so a
//!    suspended process serializes to bytes and resumes anywhere
//!
//! ## Layout
//!
//! - `types`: commands, frames, threads
//! - `state`: frame arena, variable scoping, serialization
//! - `commands`: per-command evaluation
//! - `exec_loop`: scheduling and unwinding
//! - `runtime`: prepare / start / resume / cancel
//! - `context`: the task-facing facade
//! - `task`, `stdlib`: task plugins and built-ins
//! - `checkpoint`: durable state envelopes

pub mod checkpoint;
pub mod commands;
pub mod context;
pub mod errors;
pub mod exec_loop;
pub mod runtime;
pub mod state;
pub mod stdlib;
pub mod task;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use checkpoint::{Checkpoint, CheckpointError, FileCheckpointStore};
pub use context::{Context, Execution, Variables};
pub use errors::{ErrorInfo, RuntimeError};
pub use runtime::{RunOutcome, Runtime, RuntimeBuilder};
pub use state::State;
pub use task::{Task, TaskError, TaskRegistry, TaskResult};
pub use types::{Command, Frame, FrameId, FrameKind, Thread, ThreadId, ThreadStatus};
