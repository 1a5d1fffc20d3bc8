//! # Compiler
//!
//! Turns process-definition steps into the command tree the VM executes.
//! Compilation is pure and deterministic: the same step always produces the
//! same command, so flows can be compiled lazily and recompiled after a resume.
//!
//! Checks made here (everything else is deferred to runtime):
//! - required step options are present (task name, variables, event, branches)
//! - retry counts are positive
//! - conditions parse
//! - statically named flow calls target an existing flow

mod program;
mod steps;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::model::{Location, ProcessDefinition, Step};
use crate::vm::types::Command;

pub use program::{fingerprint, Program};

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Flow not found: {name}")]
    FlowNotFound {
        name: String,
        location: Option<Location>,
    },

    #[error("Invalid '{step}' step ({location}): {message}")]
    InvalidStep {
        step: &'static str,
        location: Location,
        message: String,
    },
}

impl CompileError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            CompileError::FlowNotFound { location, .. } => location.as_ref(),
            CompileError::InvalidStep { location, .. } => Some(location),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/* ===================== Compiler ===================== */

/// Step-to-command compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile one step
    pub fn compile_step(&self, pd: &ProcessDefinition, step: &Step) -> CompileResult<Command> {
        steps::compile(pd, step)
    }

    /// Compile a flow into a single block
    pub fn compile_flow(&self, pd: &ProcessDefinition, name: &str) -> CompileResult<Command> {
        let steps = pd.flow(name).ok_or_else(|| CompileError::FlowNotFound {
            name: name.to_string(),
            location: None,
        })?;
        steps::compile_block(pd, steps)
    }
}
