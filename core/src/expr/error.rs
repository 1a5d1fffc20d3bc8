//! Expression evaluation errors

use thiserror::Error;

use crate::model::Location;

/// What went wrong while evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalErrorKind {
    #[error("variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("{0}")]
    Type(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),
}

/// Failure to evaluate an embedded expression
///
/// Recoverable: the command that triggered the evaluation decides whether it
/// aborts the thread.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationError {
    /// The offending expression source
    pub expression: String,
    pub location: Option<Location>,
    pub kind: EvalErrorKind,
}

impl EvaluationError {
    pub fn new(expression: impl Into<String>, kind: EvalErrorKind) -> Self {
        Self {
            expression: expression.into(),
            location: None,
            kind,
        }
    }

    /// Attach the location of the step being evaluated, keeping an existing one
    pub fn at(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error evaluating '{}': {}", self.expression, self.kind)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvaluationError {}
