#![allow(dead_code)]

use std::time::Duration;

use proctor::task::{CommandTask, EndpointSpec, ReadinessPattern, RetryPolicy, ServiceTask};
use proctor::types::ShutdownSignal;

/// `sh -c <script>` as a finite command.
pub fn sh(script: &str) -> CommandTask {
    CommandTask::new(script, "sh").args(["-c", script])
}

/// `sh -c <script>` retried `attempts` times on any of `codes`.
pub fn sh_retrying(script: &str, attempts: u32, codes: &[i32]) -> CommandTask {
    sh(script).retry(RetryPolicy {
        attempts,
        delay: Some(Duration::from_millis(20)),
        retryable_exit_codes: Some(codes.to_vec()),
    })
}

/// Builder for `sh -c` services.
pub struct ServiceBuilder {
    task: ServiceTask,
}

impl ServiceBuilder {
    pub fn new(title: &str, script: &str) -> Self {
        Self {
            task: ServiceTask::new(title, "sh")
                .args(["-c", script])
                .graceful_shutdown(ShutdownSignal::Term, Duration::from_secs(2))
                .readiness_timeout(Duration::from_secs(5)),
        }
    }

    /// Pattern with no endpoints.
    pub fn ready_on(mut self, name: &str, regex: &str) -> Self {
        self.task = self.task.readiness_pattern(ReadinessPattern::new(name, regex));
        self
    }

    /// Pattern whose capture `group` fills endpoint `endpoint`.
    pub fn endpoint_on(
        mut self,
        name: &str,
        regex: &str,
        endpoint: &str,
        base_url: &str,
        group: usize,
        monitor_port: bool,
    ) -> Self {
        let pattern = ReadinessPattern::new(name, regex).endpoint(
            EndpointSpec::new(endpoint, base_url, group).monitor_port_release(monitor_port),
        );
        self.task = self.task.readiness_pattern(pattern);
        self
    }

    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.task = self.task.readiness_timeout(timeout);
        self
    }

    pub fn shutdown(mut self, signal: ShutdownSignal, timeout: Duration) -> Self {
        self.task = self.task.graceful_shutdown(signal, timeout);
        self
    }

    pub fn build(self) -> ServiceTask {
        self.task
    }
}
