// src/process/mod.rs

//! Process-control primitives shared by both executors.
//!
//! - [`validate`] rejects malformed or dangerous process specs before spawn.
//! - [`spawn`] starts a child in its own process group and hands out an
//!   exit watcher plus a control handle; the `Child` itself is owned by a
//!   background supervisor task.
//! - [`buffer`] is the size-capped output buffer used for command results.
//! - [`log_ring`] is the fixed-capacity log kept for services.
//! - [`signal`] is the platform abstraction over signal delivery.
//! - [`terminate`] implements graceful-then-forced termination.
//! - [`port`] checks whether a TCP port is free again.

pub mod buffer;
pub mod log_ring;
pub mod port;
pub mod signal;
pub mod spawn;
pub mod terminate;
pub mod validate;

pub use buffer::{Append, CappedBuffer, TRUNCATION_MARKER};
pub use log_ring::{LogLine, LogRing};
pub use port::{PortReleaseOutcome, is_port_free, wait_for_release};
pub use signal::{SignalDelivery, SignalTarget};
pub use spawn::{ExitInfo, ExitWatch, ProcessControl, SpawnedProcess, spawn_process};
pub use terminate::{TerminationReport, TerminationStep, terminate};
pub use validate::{ALLOW_DANGEROUS_ENV, DANGEROUS_COMMANDS, validate_process};
