//! Application-level orchestration.
//!
//! Owns the engine-task lifecycle: one task per start command, outcomes
//! folded back into the event stream. UI layers talk to it over a command
//! channel and never touch the engine directly.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
