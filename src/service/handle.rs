// src/service/handle.rs

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::process::{ExitInfo, PortReleaseOutcome};
use crate::types::ServiceStatus;

/// Point-in-time view of a live service.
///
/// The live record stays inside the executor; this is a copy taken when it
/// was requested. Address the service by `id` to act on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHandle {
    pub id: String,
    /// Id of the descriptor the service was started from.
    pub task_id: String,
    pub title: String,
    pub pid: Option<u32>,
    pub status: ServiceStatus,
    /// Endpoint name to resolved URL.
    pub endpoints: BTreeMap<String, String>,
    /// Readiness pattern name to its capture groups.
    pub matches: BTreeMap<String, Vec<Option<String>>>,
    pub created_at: DateTime<Utc>,
}

impl ServiceHandle {
    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.endpoints.get(name).map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StopOptions {
    /// Overrides the descriptor's graceful timeout.
    pub timeout: Option<Duration>,
    /// Kill the process group right away.
    pub force: bool,
}

impl StopOptions {
    pub fn graceful() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            timeout: None,
            force: true,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What happened while stopping a service.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub id: String,
    pub exit: Option<ExitInfo>,
    /// A kill was needed (forced stop, or the grace period ran out).
    pub forced: bool,
    /// `None` when no endpoint asked for port-release monitoring.
    pub ports: Option<PortReleaseOutcome>,
}
