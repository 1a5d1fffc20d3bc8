//! Built-in tasks
//!
//! Registered by `TaskRegistry::with_stdlib`:
//! - `log`: write a message to the process log
//! - `echo`: return the evaluated input unchanged

pub mod echo;
pub mod log;

use super::task::TaskRegistry;

/// Register every built-in task
pub fn register(registry: &mut TaskRegistry) {
    registry.register("log", log::LogTask);
    registry.register("echo", echo::EchoTask);
}
