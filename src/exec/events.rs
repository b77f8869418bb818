// src/exec/events.rs

use std::time::Duration;

use crate::types::OutputStream;

/// Why another attempt is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Timeout,
    ExitCode(i32),
}

/// Notifications from [`super::CommandExecutor`], in emission order:
/// attempt started, process started, output chunks (with at most one
/// truncation warning per stream), retry scheduled, and finally completed.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    AttemptStarted {
        task_id: String,
        attempt: u32,
        max_attempts: u32,
    },
    ProcessStarted {
        task_id: String,
        attempt: u32,
        pid: Option<u32>,
    },
    Output {
        task_id: String,
        attempt: u32,
        stream: OutputStream,
        chunk: String,
    },
    OutputTruncated {
        task_id: String,
        attempt: u32,
        stream: OutputStream,
        limit: usize,
    },
    RetryScheduled {
        task_id: String,
        next_attempt: u32,
        delay: Duration,
        reason: RetryReason,
    },
    Completed {
        task_id: String,
        attempts: u32,
        exit_code: Option<i32>,
        timed_out: bool,
        success: bool,
        duration: Duration,
    },
}

impl CommandEvent {
    pub fn task_id(&self) -> &str {
        match self {
            CommandEvent::AttemptStarted { task_id, .. }
            | CommandEvent::ProcessStarted { task_id, .. }
            | CommandEvent::Output { task_id, .. }
            | CommandEvent::OutputTruncated { task_id, .. }
            | CommandEvent::RetryScheduled { task_id, .. }
            | CommandEvent::Completed { task_id, .. } => task_id,
        }
    }
}
