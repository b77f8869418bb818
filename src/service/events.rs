// src/service/events.rs

use std::collections::BTreeMap;

use crate::process::{ExitInfo, SignalTarget};
use crate::types::{OutputStream, ShutdownSignal};

/// Lifecycle notifications from [`super::ServiceExecutor`].
///
/// A service that disappears from the registry always announces it with
/// one of `ServiceStopped`, `ServiceExited` or `ServiceFailed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    ProcessSpawned {
        service_id: String,
        pid: Option<u32>,
    },
    ServiceStarted {
        service_id: String,
        title: String,
    },
    /// Every readiness pattern matched.
    ServiceReady {
        service_id: String,
        endpoints: BTreeMap<String, String>,
    },
    /// The readiness timeout elapsed first; the service is running anyway.
    BootTimeout {
        service_id: String,
        unmatched: Vec<String>,
        endpoints: BTreeMap<String, String>,
    },
    Output {
        service_id: String,
        stream: OutputStream,
        line: String,
    },
    ServiceStopping {
        service_id: String,
        signal: ShutdownSignal,
        force: bool,
    },
    ServiceStopped {
        service_id: String,
        exit: Option<ExitInfo>,
    },
    /// The process died on its own while running.
    ServiceExited {
        service_id: String,
        exit: Option<ExitInfo>,
    },
    /// Spawn failure, or the process died while booting.
    ServiceFailed {
        service_id: String,
        reason: String,
    },
    CheckingPortRelease {
        service_id: String,
        ports: Vec<u16>,
    },
    PortsReleased {
        service_id: String,
        ports: Vec<u16>,
    },
    PortReleaseTimedOut {
        service_id: String,
        still_bound: Vec<u16>,
        released: Vec<u16>,
    },
    /// The graceful shutdown signal (SIGTERM unless configured otherwise)
    /// reached the process group.
    ShutdownSignalSent {
        service_id: String,
        signal: ShutdownSignal,
        target: SignalTarget,
    },
    /// SIGKILL was issued, either on request or after the grace period.
    ProcessForceKilled {
        service_id: String,
        target: SignalTarget,
    },
}

impl ServiceEvent {
    pub fn service_id(&self) -> &str {
        match self {
            ServiceEvent::ProcessSpawned { service_id, .. }
            | ServiceEvent::ServiceStarted { service_id, .. }
            | ServiceEvent::ServiceReady { service_id, .. }
            | ServiceEvent::BootTimeout { service_id, .. }
            | ServiceEvent::Output { service_id, .. }
            | ServiceEvent::ServiceStopping { service_id, .. }
            | ServiceEvent::ServiceStopped { service_id, .. }
            | ServiceEvent::ServiceExited { service_id, .. }
            | ServiceEvent::ServiceFailed { service_id, .. }
            | ServiceEvent::CheckingPortRelease { service_id, .. }
            | ServiceEvent::PortsReleased { service_id, .. }
            | ServiceEvent::PortReleaseTimedOut { service_id, .. }
            | ServiceEvent::ShutdownSignalSent { service_id, .. }
            | ServiceEvent::ProcessForceKilled { service_id, .. } => service_id,
        }
    }

    /// Whether this event means the service left the registry.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ServiceEvent::ServiceStopped { .. }
                | ServiceEvent::ServiceExited { .. }
                | ServiceEvent::ServiceFailed { .. }
        )
    }
}
