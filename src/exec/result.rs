// src/exec/result.rs

use std::time::Duration;

/// Outcome of a finite command that resolved successfully.
///
/// `exit_code` is non-zero only when the task set `ignore_exit_code`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Wall time from the first attempt's start, retries and delays included.
    pub duration: Duration,
    /// Attempts made beyond the first.
    pub retry_count: u32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}
