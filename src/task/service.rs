// src/task/service.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::task::descriptor::{ProcessSpec, TaskDescriptor};
use crate::types::{ShutdownSignal, TaskKind};

pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Signal to send first, and how long to wait before escalating to a kill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GracefulShutdown {
    pub signal: ShutdownSignal,
    pub timeout: Duration,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self {
            signal: ShutdownSignal::Term,
            timeout: DEFAULT_GRACEFUL_TIMEOUT,
        }
    }
}

/// A named URL filled in from a readiness pattern's capture group.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSpec {
    pub endpoint_name: String,
    /// Base URL, e.g. `http://localhost`. The captured value is appended as
    /// a port when it is numeric.
    pub default_host_url: String,
    /// Capture group index; `0` is the whole match.
    pub capture_group: usize,
    /// Poll for the port to become free again after the service stops.
    pub monitor_port_release_on_termination: bool,
}

impl EndpointSpec {
    pub fn new(
        endpoint_name: impl Into<String>,
        default_host_url: impl Into<String>,
        capture_group: usize,
    ) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            default_host_url: default_host_url.into(),
            capture_group,
            monitor_port_release_on_termination: false,
        }
    }

    pub fn monitor_port_release(mut self, monitor: bool) -> Self {
        self.monitor_port_release_on_termination = monitor;
        self
    }
}

/// One boot milestone. Matched at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessPattern {
    pub regex: String,
    pub name: String,
    pub endpoints: Vec<EndpointSpec>,
}

impl ReadinessPattern {
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            name: name.into(),
            endpoints: Vec::new(),
        }
    }

    pub fn endpoint(mut self, endpoint: EndpointSpec) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessSpec {
    /// Evaluated in declaration order.
    pub patterns: Vec<ReadinessPattern>,
    pub timeout: Duration,
}

impl Default for ReadinessSpec {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

/// A long-running background process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTask {
    pub descriptor: TaskDescriptor,
    pub process: ProcessSpec,
    pub graceful_shutdown: GracefulShutdown,
    pub readiness: ReadinessSpec,
}

impl ServiceTask {
    pub fn new(title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            descriptor: TaskDescriptor::new(TaskKind::Service, title),
            process: ProcessSpec::new(command),
            graceful_shutdown: GracefulShutdown::default(),
            readiness: ReadinessSpec::default(),
        }
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

    pub fn graceful_shutdown(mut self, signal: ShutdownSignal, timeout: Duration) -> Self {
        self.graceful_shutdown = GracefulShutdown { signal, timeout };
        self
    }

    pub fn readiness_pattern(mut self, pattern: ReadinessPattern) -> Self {
        self.readiness.patterns.push(pattern);
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness.timeout = timeout;
        self
    }

    /// Endpoints whose ports should be verified free after the service stops.
    pub fn monitored_endpoints(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.readiness
            .patterns
            .iter()
            .flat_map(|p| p.endpoints.iter())
            .filter(|e| e.monitor_port_release_on_termination)
    }
}
