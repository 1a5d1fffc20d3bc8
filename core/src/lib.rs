//! Tempo core: compile process definitions into command trees and run them on
//! a suspendable, serializable VM.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod expr;
pub mod model;
pub mod vm;

// Re-export main types
pub use compiler::{CompileError, Compiler, Program};
pub use config::Config;
pub use model::{Location, ProcessDefinition, Step, StepKind};
pub use vm::{Context, RunOutcome, Runtime, State, Task, TaskResult};
