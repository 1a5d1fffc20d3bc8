//! Type definitions for the virtual machine
//!
//! - Commands (the compiled tree)
//! - Frames (scopes with pending commands)
//! - Threads (frame stacks with a status)

pub mod command;
pub mod frame;
pub mod thread;

pub use command::Command;
pub use frame::{Frame, FrameId, FrameKind};
pub use thread::{Thread, ThreadId, ThreadStatus};
