// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use proctor::config::{load_and_validate, parse_and_validate, parse_duration};
use proctor::errors::ProctorError;
use proctor::types::{OverflowPolicy, ShutdownSignal};
use tempfile::NamedTempFile;

fn expect_config_error(toml: &str, needle: &str) {
    match parse_and_validate(toml) {
        Err(ProctorError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}");
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_full_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[executor]
max_output_bytes = 4096
overflow = "drain"
retry_delay = "250ms"
retryable_exit_codes = [75]
log_capacity = 50
port_check_interval = "100ms"
port_check_retries = 3
kill_wait = "1s"
max_line_bytes = 2048

[[command]]
title = "install deps"
command = "npm"
args = ["install"]
timeout = "2m"
retry_attempts = 2
env = {{ CI = "1" }}

[[service]]
title = "dev server"
id = "dev"
command = "npm"
args = ["run", "dev"]
graceful_shutdown = {{ signal = "SIGINT", timeout = "3s" }}

[service.readiness]
timeout = "45s"

[[service.readiness.patterns]]
regex = 'ready on http://localhost:(\d+)'
name = "http"
endpoints = [{{ endpoint_name = "main-service", endpoint_default_host_url = "http://localhost", endpoint_capture_group = 1, monitor_port_release_on_termination = true }}]
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.command_executor.max_output_bytes, 4096);
    assert_eq!(cfg.command_executor.overflow, OverflowPolicy::Drain);
    assert_eq!(cfg.command_executor.retry_delay, Duration::from_millis(250));
    assert_eq!(cfg.command_executor.retryable_exit_codes, vec![75]);
    assert_eq!(cfg.command_executor.kill_wait, Duration::from_secs(1));
    assert_eq!(cfg.service_executor.log_capacity, 50);
    assert_eq!(cfg.service_executor.port_check_interval, Duration::from_millis(100));
    assert_eq!(cfg.service_executor.port_check_retries, 3);
    assert_eq!(cfg.service_executor.max_line_bytes, 2048);

    let cmd = &cfg.commands[0];
    assert_eq!(cmd.title(), "install deps");
    assert_eq!(cmd.process.args, vec!["install"]);
    assert_eq!(cmd.timeout, Some(Duration::from_secs(120)));
    assert_eq!(cmd.retry.max_attempts(), 2);
    assert_eq!(cmd.process.env.get("CI").map(String::as_str), Some("1"));

    let svc = &cfg.services[0];
    assert_eq!(svc.descriptor.id, "dev");
    assert_eq!(svc.graceful_shutdown.signal, ShutdownSignal::Int);
    assert_eq!(svc.graceful_shutdown.timeout, Duration::from_secs(3));
    assert_eq!(svc.readiness.timeout, Duration::from_secs(45));
    assert_eq!(svc.readiness.patterns.len(), 1);
    let ep = &svc.readiness.patterns[0].endpoints[0];
    assert_eq!(ep.endpoint_name, "main-service");
    assert_eq!(ep.capture_group, 1);
    assert!(ep.monitor_port_release_on_termination);
}

#[test]
fn test_defaults_apply_when_sections_are_missing() {
    let cfg = parse_and_validate(
        r#"
[[service]]
title = "web"
command = "python3"
args = ["-m", "http.server"]
"#,
    )
    .unwrap();

    assert_eq!(cfg.command_executor.max_output_bytes, 1024 * 1024);
    assert_eq!(cfg.command_executor.overflow, OverflowPolicy::Pause);
    assert_eq!(cfg.command_executor.retry_delay, Duration::from_secs(1));
    assert_eq!(cfg.service_executor.log_capacity, 1000);
    assert_eq!(cfg.service_executor.port_check_retries, 10);
    assert_eq!(cfg.service_executor.max_line_bytes, 64 * 1024);

    let svc = &cfg.services[0];
    assert_eq!(svc.graceful_shutdown.signal, ShutdownSignal::Term);
    assert_eq!(svc.graceful_shutdown.timeout, Duration::from_secs(5));
    assert_eq!(svc.readiness.timeout, Duration::from_secs(30));
    assert!(svc.readiness.patterns.is_empty());
}

#[test]
fn test_capture_group_defaults_to_first_group() {
    let cfg = parse_and_validate(
        r#"
[[service]]
title = "web"
command = "srv"

[[service.readiness.patterns]]
regex = 'port (\d+)'
name = "with-group"
endpoints = [{ endpoint_name = "a", endpoint_default_host_url = "http://localhost" }]

[[service.readiness.patterns]]
regex = 'started'
name = "no-group"
endpoints = [{ endpoint_name = "b", endpoint_default_host_url = "http://localhost:80" }]
"#,
    )
    .unwrap();

    let patterns = &cfg.services[0].readiness.patterns;
    assert_eq!(patterns[0].endpoints[0].capture_group, 1);
    assert_eq!(patterns[1].endpoints[0].capture_group, 0);
}

#[test]
fn test_args_must_be_a_list() {
    expect_config_error(
        r#"
[[command]]
title = "bad"
command = "echo"
args = "hello world"
"#,
        "args must be an array",
    );

    expect_config_error(
        r#"
[[command]]
title = "bad"
command = "echo"
args = ["ok", 3]
"#,
        "args[1] must be a string",
    );
}

#[test]
fn test_empty_config_is_rejected() {
    expect_config_error("", "at least one");
}

#[test]
fn test_empty_command_is_rejected() {
    expect_config_error(
        r#"
[[command]]
title = "blank"
command = "  "
"#,
        "must not be empty",
    );
}

#[test]
fn test_bad_values_are_reported_with_context() {
    expect_config_error(
        r#"
[[command]]
title = "slow"
command = "sleep"
timeout = "10 parsecs"
"#,
        "command 'slow': timeout",
    );

    expect_config_error(
        r#"
[[command]]
title = "never"
command = "true"
retry_attempts = 0
"#,
        "retry_attempts must be >= 1",
    );

    expect_config_error(
        r#"
[[service]]
title = "svc"
command = "srv"
graceful_shutdown = { signal = "SIGBOGUS" }
"#,
        "unknown shutdown signal",
    );

    expect_config_error(
        r#"
[[service]]
title = "svc"
command = "srv"

[[service.readiness.patterns]]
regex = '(oops'
name = "broken"
"#,
        "invalid regex",
    );

    expect_config_error(
        r#"
[executor]
log_capacity = 0

[[command]]
title = "x"
command = "true"
"#,
        "log_capacity",
    );

    expect_config_error(
        r#"
[executor]
max_line_bytes = 0

[[command]]
title = "x"
command = "true"
"#,
        "max_line_bytes",
    );
}

#[test]
fn test_duplicate_ids_are_rejected() {
    expect_config_error(
        r#"
[[command]]
title = "a"
id = "same"
command = "true"

[[service]]
title = "b"
id = "same"
command = "srv"
"#,
        "used more than once",
    );
}

#[test]
fn test_unknown_overflow_policy_is_a_parse_error() {
    let result = parse_and_validate(
        r#"
[executor]
overflow = "explode"

[[command]]
title = "x"
command = "true"
"#,
    );
    assert!(matches!(result, Err(ProctorError::TomlError(_))), "{result:?}");
}

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
    assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("5").is_err());
    assert!(parse_duration("s").is_err());
    assert!(parse_duration("3d").is_err());
}

#[test]
fn test_missing_file_is_an_io_error() {
    let result = load_and_validate("/definitely/not/here/Proctor.toml");
    assert!(matches!(result, Err(ProctorError::IoError(_))));
}
