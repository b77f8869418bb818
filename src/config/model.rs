// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::exec::CommandExecutorConfig;
use crate::service::ServiceExecutorConfig;
use crate::task::{CommandTask, ServiceTask};
use crate::types::OverflowPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [executor]
/// retry_delay = "1s"
///
/// [[command]]
/// title = "install deps"
/// command = "npm"
/// args = ["install"]
///
/// [[service]]
/// title = "dev server"
/// command = "npm"
/// args = ["run", "dev"]
/// ```
///
/// All sections are optional and have reasonable defaults, but validation
/// requires at least one command or service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Executor tuning from `[executor]`.
    #[serde(default)]
    pub executor: ExecutorSection,

    /// `[[command]]` entries, run in file order.
    #[serde(default, rename = "command")]
    pub commands: Vec<RawCommand>,

    /// `[[service]]` entries, started in file order.
    #[serde(default, rename = "service")]
    pub services: Vec<RawService>,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Capture limit per output stream of a command, in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// `"pause"` (default) stops reading once the limit is hit; `"drain"`
    /// keeps reading and discards.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    /// Exit codes that trigger a retry when a command sets none itself.
    #[serde(default)]
    pub retryable_exit_codes: Vec<i32>,

    /// Log lines kept per service.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    #[serde(default = "default_port_check_interval")]
    pub port_check_interval: String,

    #[serde(default = "default_port_check_retries")]
    pub port_check_retries: u32,

    #[serde(default = "default_kill_wait")]
    pub kill_wait: String,

    /// Service output lines longer than this are split.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_max_output_bytes() -> usize {
    crate::exec::command::DEFAULT_MAX_OUTPUT_BYTES
}

fn default_retry_delay() -> String {
    "1s".to_string()
}

fn default_log_capacity() -> usize {
    crate::service::executor::DEFAULT_LOG_CAPACITY
}

fn default_port_check_interval() -> String {
    "500ms".to_string()
}

fn default_port_check_retries() -> u32 {
    crate::service::executor::DEFAULT_PORT_CHECK_RETRIES
}

fn default_kill_wait() -> String {
    "2s".to_string()
}

fn default_max_line_bytes() -> usize {
    crate::service::executor::DEFAULT_MAX_LINE_BYTES
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_output_bytes: default_max_output_bytes(),
            overflow: OverflowPolicy::default(),
            retry_delay: default_retry_delay(),
            retryable_exit_codes: Vec::new(),
            log_capacity: default_log_capacity(),
            port_check_interval: default_port_check_interval(),
            port_check_retries: default_port_check_retries(),
            kill_wait: default_kill_wait(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// `[[command]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub title: String,

    /// Overrides the generated descriptor id.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub instructions: Option<String>,

    pub command: String,

    /// Kept untyped so that a non-list value is reported as a validation
    /// error instead of a parse error.
    #[serde(default)]
    pub args: Option<toml::Value>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Wall-clock limit per attempt, e.g. `"120s"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Total attempts, first one included.
    #[serde(default)]
    pub retry_attempts: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub retryable_exit_codes: Option<Vec<i32>>,

    #[serde(default)]
    pub ignore_exit_code: bool,
}

/// `[[service]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub title: String,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub instructions: Option<String>,

    pub command: String,

    #[serde(default)]
    pub args: Option<toml::Value>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub graceful_shutdown: Option<RawGracefulShutdown>,

    #[serde(default)]
    pub readiness: Option<RawReadiness>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawGracefulShutdown {
    /// `"SIGTERM"`, `"TERM"` or a number; default SIGTERM.
    #[serde(default)]
    pub signal: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReadiness {
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub patterns: Vec<RawPattern>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPattern {
    pub regex: String,
    pub name: String,

    #[serde(default)]
    pub endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEndpoint {
    pub endpoint_name: String,
    pub endpoint_default_host_url: String,

    /// Defaults to group 1 when the regex has one, else the whole match.
    #[serde(default)]
    pub endpoint_capture_group: Option<usize>,

    #[serde(default)]
    pub monitor_port_release_on_termination: bool,
}

/// Validated configuration, ready to drive the executors.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub command_executor: CommandExecutorConfig,
    pub service_executor: ServiceExecutorConfig,
    pub commands: Vec<CommandTask>,
    pub services: Vec<ServiceTask>,
}
