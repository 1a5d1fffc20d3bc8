//! Per-step compilation

use super::{CompileError, CompileResult};
use crate::expr;
use crate::model::{Location, ProcessDefinition, Step, StepKind};
use crate::vm::types::Command;

/// Compile a sequence of steps into a block
pub(super) fn compile_block(pd: &ProcessDefinition, steps: &[Step]) -> CompileResult<Command> {
    let commands = steps
        .iter()
        .map(|step| compile(pd, step))
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(Command::Block { commands })
}

pub(super) fn compile(pd: &ProcessDefinition, step: &Step) -> CompileResult<Command> {
    let location = step.location.clone();
    let invalid = |message: &str| CompileError::InvalidStep {
        step: step.kind.name(),
        location: step.location.clone(),
        message: message.to_string(),
    };

    match &step.kind {
        StepKind::Task {
            name,
            input,
            out,
            retry,
            ignore_errors,
        } => {
            if name.trim().is_empty() {
                return Err(invalid("task name is required"));
            }

            let call = Command::TaskCall {
                location: location.clone(),
                name: name.clone(),
                input: input.clone(),
                out: out.clone(),
                ignore_errors: *ignore_errors,
            };

            match retry {
                None => Ok(call),
                Some(options) if options.times == 0 => {
                    Err(invalid("retry times must be greater than zero"))
                }
                Some(options) => Ok(Command::Retry {
                    location,
                    body: Box::new(call),
                    times: options.times,
                    attempt: 0,
                }),
            }
        }

        StepKind::Throw { exception } => {
            if exception.is_null() {
                return Err(invalid("exception is required"));
            }
            Ok(Command::Throw {
                location,
                exception: exception.clone(),
            })
        }

        StepKind::Set { vars } => {
            if vars.is_empty() {
                return Err(invalid("at least one variable is required"));
            }
            Ok(Command::SetVariables {
                location,
                vars: vars.clone(),
            })
        }

        StepKind::If {
            expression,
            then,
            otherwise,
        } => {
            check_condition(expression).map_err(|message| invalid(&message))?;

            let then = compile_block(pd, then)?;
            let otherwise = match otherwise {
                Some(steps) => Some(Box::new(compile_block(pd, steps)?)),
                None => None,
            };
            Ok(Command::Conditional {
                location,
                expression: expression.clone(),
                then: Box::new(then),
                otherwise,
            })
        }

        StepKind::Suspend { event } => {
            if event.trim().is_empty() {
                return Err(invalid("event name is required"));
            }
            Ok(Command::Suspend {
                location,
                event: event.clone(),
            })
        }

        StepKind::Call { flow, input, out } => {
            if flow.trim().is_empty() {
                return Err(invalid("flow name is required"));
            }
            // Dynamic names are resolved when the call runs
            if !expr::has_expression(flow) && pd.flow(flow).is_none() {
                return Err(flow_not_found(flow, &location));
            }
            Ok(Command::Call {
                location,
                flow: flow.clone(),
                input: input.clone(),
                out: out.clone(),
            })
        }

        StepKind::Try { steps, error } => Ok(Command::Try {
            location,
            body: Box::new(compile_block(pd, steps)?),
            handler: Box::new(compile_block(pd, error)?),
        }),

        StepKind::Parallel { branches, out } => {
            if branches.is_empty() {
                return Err(invalid("at least one branch is required"));
            }
            let branches = branches
                .iter()
                .map(|steps| compile_block(pd, steps))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Command::Parallel {
                location,
                branches,
                out: out.clone(),
            })
        }
    }
}

fn flow_not_found(name: &str, location: &Location) -> CompileError {
    CompileError::FlowNotFound {
        name: name.to_string(),
        location: Some(location.clone()),
    }
}

/// Parse a condition without evaluating it
fn check_condition(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("expression is required".to_string());
    }
    let parsed = if expr::has_expression(source) {
        expr::parser::parse_template(source).map(|_| ())
    } else {
        expr::parser::parse_expression(source).map(|_| ())
    };
    parsed.map_err(|e| e.to_string())
}
