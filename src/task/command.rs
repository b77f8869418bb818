// src/task/command.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::task::descriptor::{ProcessSpec, TaskDescriptor};
use crate::types::TaskKind;

/// How often a finite command may be attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Values below 1
    /// are treated as 1.
    pub attempts: u32,
    /// Fixed pause between attempts. `None` uses the executor default.
    pub delay: Option<Duration>,
    /// Exit codes worth another attempt. `None` uses the executor default.
    pub retryable_exit_codes: Option<Vec<i32>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            delay: None,
            retryable_exit_codes: None,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

/// A command that runs to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTask {
    pub descriptor: TaskDescriptor,
    pub process: ProcessSpec,
    /// Wall-clock budget per attempt. `None` means no timer.
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// Resolve successfully with the observed exit code instead of failing
    /// on a non-zero exit.
    pub ignore_exit_code: bool,
}

impl CommandTask {
    pub fn new(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            descriptor: TaskDescriptor::new(TaskKind::Command, title),
            process: ProcessSpec::new(command),
            timeout: None,
            retry: RetryPolicy::default(),
            ignore_exit_code: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn title(&self) -> &str {
        &self.descriptor.title
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.process.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.process.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn ignore_exit_code(mut self, ignore: bool) -> Self {
        self.ignore_exit_code = ignore;
        self
    }
}
