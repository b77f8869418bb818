// src/exec/mod.rs

//! Finite-command execution.
//!
//! [`CommandExecutor`] runs one [`crate::task::CommandTask`] to completion:
//! validate, spawn, collect output into capped buffers, enforce the
//! wall-clock timeout and retry on the configured failure conditions.
//!
//! - [`command`] holds the executor and its retry loop.
//! - [`stream`] pumps stdout/stderr into buffers and caller callbacks.
//! - [`events`] defines the notifications emitted while a command runs.
//! - [`result`] is the value handed back on success.

pub mod command;
pub mod events;
pub mod result;
pub mod stream;

pub use command::{CommandExecutor, CommandExecutorConfig};
pub use events::{CommandEvent, RetryReason};
pub use result::CommandResult;
pub use stream::{ChunkHandler, StreamHandlers};
