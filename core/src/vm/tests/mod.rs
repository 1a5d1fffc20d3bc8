//! Tests for the VM
//!
//! Organized by feature area

mod helpers;
mod scope_tests;
mod task_tests;
