// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, ExecutorSection, RawCommand, RawConfigFile, RawEndpoint, RawPattern, RawService,
};
use crate::errors::{ProctorError, Result};
use crate::exec::CommandExecutorConfig;
use crate::service::{ReadinessMatcher, ServiceExecutorConfig};
use crate::task::{
    CommandTask, EndpointSpec, GracefulShutdown, ProcessSpec, ReadinessPattern, RetryPolicy,
    ServiceTask,
};
use crate::types::ShutdownSignal;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProctorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let (command_executor, service_executor) = build_executor_configs(&raw.executor)?;
        let commands = raw
            .commands
            .iter()
            .map(build_command)
            .collect::<Result<Vec<_>>>()?;
        let services = raw
            .services
            .iter()
            .map(build_service)
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigFile {
            command_executor,
            service_executor,
            commands,
            services,
        })
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_executor_section(&cfg.executor)?;
    validate_unique_ids(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.commands.is_empty() && cfg.services.is_empty() {
        return Err(ProctorError::ConfigError(
            "config must contain at least one [[command]] or [[service]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor_section(section: &ExecutorSection) -> Result<()> {
    if section.max_output_bytes == 0 {
        return Err(ProctorError::ConfigError(
            "[executor].max_output_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.log_capacity == 0 {
        return Err(ProctorError::ConfigError(
            "[executor].log_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.max_line_bytes == 0 {
        return Err(ProctorError::ConfigError(
            "[executor].max_line_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.port_check_retries == 0 {
        return Err(ProctorError::ConfigError(
            "[executor].port_check_retries must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_unique_ids(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = BTreeSet::new();
    let ids = cfg
        .commands
        .iter()
        .filter_map(|c| c.id.as_deref())
        .chain(cfg.services.iter().filter_map(|s| s.id.as_deref()));
    for id in ids {
        if !seen.insert(id) {
            return Err(ProctorError::ConfigError(format!(
                "task id '{id}' is used more than once"
            )));
        }
    }
    Ok(())
}

fn build_executor_configs(
    section: &ExecutorSection,
) -> Result<(CommandExecutorConfig, ServiceExecutorConfig)> {
    let kill_wait = duration_field("[executor].kill_wait", &section.kill_wait)?;

    let command = CommandExecutorConfig {
        max_output_bytes: section.max_output_bytes,
        overflow: section.overflow,
        retry_delay: duration_field("[executor].retry_delay", &section.retry_delay)?,
        retryable_exit_codes: section.retryable_exit_codes.clone(),
        kill_wait,
    };
    let service = ServiceExecutorConfig {
        log_capacity: section.log_capacity,
        port_check_interval: duration_field(
            "[executor].port_check_interval",
            &section.port_check_interval,
        )?,
        port_check_retries: section.port_check_retries,
        kill_wait,
        max_line_bytes: section.max_line_bytes,
    };
    Ok((command, service))
}

fn build_command(raw: &RawCommand) -> Result<CommandTask> {
    let context = format!("command '{}'", raw.title);
    let mut task = CommandTask::new(&raw.title, &raw.command);
    task.process = build_process(
        &context,
        &raw.command,
        raw.args.as_ref(),
        raw.cwd.clone(),
        raw.env.clone(),
    )?;
    if let Some(id) = &raw.id {
        task.descriptor = task.descriptor.with_id(id);
    }
    if let Some(text) = &raw.instructions {
        task.descriptor = task.descriptor.with_instructions(text);
    }

    task.timeout = optional_duration(&format!("{context}: timeout"), raw.timeout.as_deref())?;

    let attempts = raw.retry_attempts.unwrap_or(1);
    if attempts == 0 {
        return Err(ProctorError::ConfigError(format!(
            "{context}: retry_attempts must be >= 1 (got 0)"
        )));
    }
    task.retry = RetryPolicy {
        attempts,
        delay: optional_duration(
            &format!("{context}: retry_delay"),
            raw.retry_delay.as_deref(),
        )?,
        retryable_exit_codes: raw.retryable_exit_codes.clone(),
    };
    task.ignore_exit_code = raw.ignore_exit_code;

    Ok(task)
}

fn build_service(raw: &RawService) -> Result<ServiceTask> {
    let context = format!("service '{}'", raw.title);
    let mut task = ServiceTask::new(&raw.title, &raw.command);
    task.process = build_process(
        &context,
        &raw.command,
        raw.args.as_ref(),
        raw.cwd.clone(),
        raw.env.clone(),
    )?;
    if let Some(id) = &raw.id {
        task.descriptor = task.descriptor.with_id(id);
    }
    if let Some(text) = &raw.instructions {
        task.descriptor = task.descriptor.with_instructions(text);
    }

    if let Some(shutdown) = &raw.graceful_shutdown {
        let mut graceful = GracefulShutdown::default();
        if let Some(signal) = &shutdown.signal {
            graceful.signal = signal.parse::<ShutdownSignal>().map_err(|e| {
                ProctorError::ConfigError(format!("{context}: graceful_shutdown.signal: {e}"))
            })?;
        }
        if let Some(timeout) = optional_duration(
            &format!("{context}: graceful_shutdown.timeout"),
            shutdown.timeout.as_deref(),
        )? {
            graceful.timeout = timeout;
        }
        task.graceful_shutdown = graceful;
    }

    if let Some(readiness) = &raw.readiness {
        if let Some(timeout) = optional_duration(
            &format!("{context}: readiness.timeout"),
            readiness.timeout.as_deref(),
        )? {
            task.readiness.timeout = timeout;
        }
        task.readiness.patterns = readiness
            .patterns
            .iter()
            .map(|p| build_pattern(&context, p))
            .collect::<Result<Vec<_>>>()?;
    }

    ReadinessMatcher::new(&task.readiness.patterns).map_err(|e| match e {
        ProctorError::ValidationError(msg) => ProctorError::ConfigError(format!("{context}: {msg}")),
        other => other,
    })?;

    Ok(task)
}

fn build_pattern(context: &str, raw: &RawPattern) -> Result<ReadinessPattern> {
    let regex = Regex::new(&raw.regex).map_err(|e| {
        ProctorError::ConfigError(format!(
            "{context}: readiness pattern '{}' has an invalid regex: {e}",
            raw.name
        ))
    })?;
    let has_group = regex.captures_len() > 1;

    let mut pattern = ReadinessPattern::new(&raw.name, &raw.regex);
    for endpoint in &raw.endpoints {
        pattern = pattern.endpoint(build_endpoint(endpoint, has_group));
    }
    Ok(pattern)
}

fn build_endpoint(raw: &RawEndpoint, has_group: bool) -> EndpointSpec {
    let group = raw
        .endpoint_capture_group
        .unwrap_or(if has_group { 1 } else { 0 });
    EndpointSpec::new(&raw.endpoint_name, &raw.endpoint_default_host_url, group)
        .monitor_port_release(raw.monitor_port_release_on_termination)
}

fn build_process(
    context: &str,
    command: &str,
    args: Option<&toml::Value>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
) -> Result<ProcessSpec> {
    if command.trim().is_empty() {
        return Err(ProctorError::ConfigError(format!(
            "{context}: command must not be empty"
        )));
    }

    let mut spec = ProcessSpec::new(command);
    spec.args = parse_args(context, args)?;
    spec.cwd = cwd;
    spec.env = env;
    Ok(spec)
}

/// `args` must be a TOML array of strings.
fn parse_args(context: &str, args: Option<&toml::Value>) -> Result<Vec<String>> {
    let Some(value) = args else {
        return Ok(Vec::new());
    };
    let toml::Value::Array(items) = value else {
        return Err(ProctorError::ConfigError(format!(
            "{context}: args must be an array of strings (got {})",
            value.type_str()
        )));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            toml::Value::String(s) => Ok(s.clone()),
            other => Err(ProctorError::ConfigError(format!(
                "{context}: args[{i}] must be a string (got {})",
                other.type_str()
            ))),
        })
        .collect()
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| ProctorError::ConfigError(format!("{field}: {e}")))
}

fn optional_duration(field: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value.map(|v| duration_field(field, v)).transpose()
}
