use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which executor a descriptor is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Command,
    Service,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Command => f.write_str("command"),
            TaskKind::Service => f.write_str("service"),
        }
    }
}

/// Status a descriptor was submitted with.
///
/// Executors never write to it; live state for services is tracked in
/// [`ServiceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Lifecycle of a supervised service.
///
/// Valid transitions:
/// - `Booting -> Running -> Stopping -> Stopped`
/// - `Booting -> Failed`
/// - `Running -> Exited`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Booting,
    Running,
    Stopping,
    Stopped,
    Failed,
    Exited,
}

impl ServiceStatus {
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, next),
            (Booting, Running)
                | (Booting, Failed)
                | (Running, Stopping)
                | (Running, Exited)
                | (Stopping, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceStatus::Stopped | ServiceStatus::Failed | ServiceStatus::Exited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Booting => "booting",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Failed => "failed",
            ServiceStatus::Exited => "exited",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipe a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Signal sent to a process group to ask it to shut down.
///
/// `Kill` is accepted so a descriptor can opt out of graceful shutdown
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ShutdownSignal {
    #[default]
    Term,
    Int,
    Hup,
    Quit,
    Usr1,
    Usr2,
    Kill,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Term => "SIGTERM",
            ShutdownSignal::Int => "SIGINT",
            ShutdownSignal::Hup => "SIGHUP",
            ShutdownSignal::Quit => "SIGQUIT",
            ShutdownSignal::Usr1 => "SIGUSR1",
            ShutdownSignal::Usr2 => "SIGUSR2",
            ShutdownSignal::Kill => "SIGKILL",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShutdownSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "TERM" | "15" => Ok(ShutdownSignal::Term),
            "INT" | "2" => Ok(ShutdownSignal::Int),
            "HUP" | "1" => Ok(ShutdownSignal::Hup),
            "QUIT" | "3" => Ok(ShutdownSignal::Quit),
            "USR1" => Ok(ShutdownSignal::Usr1),
            "USR2" => Ok(ShutdownSignal::Usr2),
            "KILL" | "9" => Ok(ShutdownSignal::Kill),
            other => Err(format!(
                "unknown shutdown signal: {other} (expected TERM, INT, HUP, QUIT, USR1, USR2 or KILL)"
            )),
        }
    }
}

impl TryFrom<String> for ShutdownSignal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShutdownSignal> for String {
    fn from(value: ShutdownSignal) -> Self {
        value.name().to_string()
    }
}

/// What a command output collector does once its buffer is full.
///
/// - `Pause`: stop reading the pipe. A process that keeps writing will block
///   once the OS pipe buffer fills, which ends in the task's timeout. Tasks
///   without a timeout are drained instead, so they can still exit.
/// - `Drain`: keep reading and discard everything past the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Pause,
    Drain,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(OverflowPolicy::Pause),
            "drain" => Ok(OverflowPolicy::Drain),
            other => Err(format!(
                "invalid overflow policy: {other} (expected \"pause\" or \"drain\")"
            )),
        }
    }
}
