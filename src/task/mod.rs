// src/task/mod.rs

//! Task descriptors.
//!
//! Descriptors are plain values built by whoever decides what to run. The
//! executors take their own copy on submission and never mutate it.
//!
//! - [`descriptor`] holds the fields shared by every kind of task.
//! - [`command`] describes finite commands.
//! - [`service`] describes long-running services and how to detect that
//!   they finished booting.

pub mod command;
pub mod descriptor;
pub mod service;

pub use command::{CommandTask, RetryPolicy};
pub use descriptor::{ProcessSpec, TaskDescriptor};
pub use service::{EndpointSpec, GracefulShutdown, ReadinessPattern, ReadinessSpec, ServiceTask};
