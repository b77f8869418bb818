// tests/service_executor.rs

#![cfg(unix)]

use std::error::Error;
use std::net::{Ipv4Addr, TcpListener};
use std::time::Duration;

use nix::sys::signal::Signal;
use proctor::errors::ProctorError;
use proctor::service::{ServiceEvent, ServiceExecutor, ServiceExecutorConfig, StopOptions};
use proctor::task::ServiceTask;
use proctor::types::{OutputStream, ServiceStatus, ShutdownSignal};
use proctor_test_utils::builders::ServiceBuilder;
use proctor_test_utils::events::{collect_until, drain};
use proctor_test_utils::{free_port, init_tracing, process_gone, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const LONG: &str = "exec sleep 30";

fn fast_port_checks(retries: u32) -> ServiceExecutor {
    ServiceExecutor::new(ServiceExecutorConfig {
        port_check_interval: Duration::from_millis(20),
        port_check_retries: retries,
        ..ServiceExecutorConfig::default()
    })
}

#[tokio::test]
async fn test_service_becomes_running_with_endpoint_from_log() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new(
        "web",
        &format!("echo 'Service ready on http://localhost:9501'; {LONG}"),
    )
    .endpoint_on(
        "ready",
        r"Service ready on (http://\S+)",
        "main-service",
        "http://localhost:3000",
        1,
        false,
    )
    .build();

    let handle = with_timeout(executor.start(task)).await?;

    assert_eq!(handle.status, ServiceStatus::Running);
    assert!(handle.pid.is_some());
    assert_eq!(handle.endpoint("main-service"), Some("http://localhost:9501"));
    assert_eq!(
        handle.matches.get("ready"),
        Some(&vec![
            Some("Service ready on http://localhost:9501".to_string()),
            Some("http://localhost:9501".to_string()),
        ])
    );

    let seen = drain(&mut events);
    assert!(matches!(seen.first(), Some(ServiceEvent::ProcessSpawned { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        ServiceEvent::ServiceReady { endpoints, .. }
            if endpoints.get("main-service").map(String::as_str) == Some("http://localhost:9501")
    )));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ServiceEvent::BootTimeout { .. }))
    );

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_bare_port_capture_is_spliced_into_base_url() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("api", &format!("echo 'listening on port 8123'; {LONG}"))
        .endpoint_on(
            "port",
            r"port (\d+)",
            "api",
            "http://localhost:3000/v1",
            1,
            false,
        )
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert_eq!(handle.endpoint("api"), Some("http://localhost:8123/v1"));

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_all_patterns_must_match_before_ready() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new(
        "two-step",
        &format!("echo 'db connected'; sleep 0.2; echo 'http up'; {LONG}"),
    )
    .ready_on("db", "db connected")
    .ready_on("http", "http up")
    .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert_eq!(handle.status, ServiceStatus::Running);
    assert_eq!(handle.matches.len(), 2);

    let seen = drain(&mut events);
    let ready_at = seen
        .iter()
        .position(|e| matches!(e, ServiceEvent::ServiceReady { .. }))
        .expect("service ready event");
    let http_line_at = seen
        .iter()
        .position(|e| matches!(e, ServiceEvent::Output { line, .. } if line == "http up"))
        .expect("second readiness line");
    assert!(http_line_at < ready_at);

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_service_without_patterns_is_running_immediately() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("plain", LONG).build();

    let handle = with_timeout(executor.start(task)).await?;
    assert!(handle.is_running());
    assert!(handle.endpoints.is_empty());

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_boot_timeout_still_yields_running() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new("quiet", &format!("echo 'starting'; {LONG}"))
        .ready_on("never", "this line never appears")
        .readiness_timeout(Duration::from_millis(300))
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert_eq!(handle.status, ServiceStatus::Running);
    assert!(handle.endpoints.is_empty());

    let seen = drain(&mut events);
    let unmatched = seen.iter().find_map(|e| match e {
        ServiceEvent::BootTimeout { unmatched, .. } => Some(unmatched.clone()),
        _ => None,
    });
    assert_eq!(unmatched, Some(vec!["never".to_string()]));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ServiceEvent::ServiceReady { .. }))
    );

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_graceful_reports_exit_and_removes_service() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let handle = with_timeout(executor.start(ServiceBuilder::new("s", LONG).build())).await?;
    let pid = handle.pid.expect("pid");

    let report = with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;

    assert_eq!(report.id, handle.id);
    assert!(!report.forced);
    assert!(report.ports.is_none());
    assert_eq!(report.exit.and_then(|e| e.signal), Some(Signal::SIGTERM as i32));
    assert!(process_gone(pid));
    assert!(executor.list().is_empty());

    let seen = drain(&mut events);
    let stopping = seen.iter().position(|e| {
        matches!(
            e,
            ServiceEvent::ServiceStopping {
                signal: ShutdownSignal::Term,
                force: false,
                ..
            }
        )
    });
    let stopped = seen
        .iter()
        .position(|e| matches!(e, ServiceEvent::ServiceStopped { .. }));
    assert!(stopping.is_some());
    assert!(stopping < stopped);
    assert!(
        seen.iter()
            .any(|e| matches!(e, ServiceEvent::ShutdownSignalSent { signal: ShutdownSignal::Term, .. }))
    );
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ServiceEvent::ServiceExited { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_ignored_term_escalates_to_kill() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new(
        "stubborn",
        "trap '' TERM; echo ready; while true; do sleep 0.1; done",
    )
    .ready_on("ready", "^ready$")
    .shutdown(ShutdownSignal::Term, Duration::from_millis(300))
    .build();

    let handle = with_timeout(executor.start(task)).await?;
    let pid = handle.pid.expect("pid");
    let report = with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;

    assert!(report.forced);
    assert!(process_gone(pid));
    let seen = drain(&mut events);
    assert!(
        seen.iter()
            .any(|e| matches!(e, ServiceEvent::ProcessForceKilled { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_stop_timeout_option_overrides_descriptor() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("stubborn", "trap '' TERM; while true; do sleep 0.1; done")
        .shutdown(ShutdownSignal::Term, Duration::from_secs(30))
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    let report = with_timeout(
        executor.stop(&handle.id, StopOptions::graceful().timeout(Duration::from_millis(200))),
    )
    .await?;
    assert!(report.forced);
    Ok(())
}

#[tokio::test]
async fn test_force_stop_skips_graceful_signal() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let handle = with_timeout(executor.start(ServiceBuilder::new("s", LONG).build())).await?;

    let report = with_timeout(executor.stop(&handle.id, StopOptions::forced())).await?;

    assert!(report.forced);
    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        ServiceEvent::ServiceStopping {
            signal: ShutdownSignal::Kill,
            force: true,
            ..
        }
    )));
    assert!(
        seen.iter()
            .any(|e| matches!(e, ServiceEvent::ProcessForceKilled { .. }))
    );
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ServiceEvent::ShutdownSignalSent { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_stop_kills_the_whole_process_group() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("tree", "sleep 30 & echo \"child $!\"; wait")
        .ready_on("child", r"child (\d+)")
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    let child: u32 = handle
        .matches
        .get("child")
        .and_then(|groups| groups.get(1).cloned().flatten())
        .ok_or("child pid capture")?
        .parse()?;

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(process_gone(child), "background child {child} survived stop");
    Ok(())
}

#[tokio::test]
async fn test_released_port_is_reported() -> TestResult {
    init_tracing();
    let executor = fast_port_checks(5);
    let mut events = executor.subscribe();
    let port = free_port();
    let task = ServiceBuilder::new(
        "web",
        &format!("echo 'Service ready on http://localhost:{port}'; {LONG}"),
    )
    .endpoint_on(
        "ready",
        r"Service ready on (http://\S+)",
        "main-service",
        "http://localhost",
        1,
        true,
    )
    .build();

    let handle = with_timeout(executor.start(task)).await?;
    let report = with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;

    let ports = report.ports.ok_or("port outcome")?;
    assert_eq!(ports.released, vec![port]);
    assert!(ports.all_released());

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        ServiceEvent::CheckingPortRelease { ports, .. } if ports == &vec![port]
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        ServiceEvent::PortsReleased { ports, .. } if ports == &vec![port]
    )));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, ServiceEvent::PortReleaseTimedOut { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_port_still_bound_is_reported_without_failing_stop() -> TestResult {
    init_tracing();
    let executor = fast_port_checks(2);
    let mut events = executor.subscribe();
    let holder = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = holder.local_addr()?.port();
    let task = ServiceBuilder::new(
        "web",
        &format!("echo 'Service ready on http://127.0.0.1:{port}'; {LONG}"),
    )
    .endpoint_on(
        "ready",
        r"Service ready on (http://\S+)",
        "main-service",
        "http://localhost",
        1,
        true,
    )
    .build();

    let handle = with_timeout(executor.start(task)).await?;
    let report = with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;

    let ports = report.ports.ok_or("port outcome")?;
    assert_eq!(ports.still_bound, vec![port]);
    assert_eq!(ports.checks, 2);

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        ServiceEvent::PortReleaseTimedOut { still_bound, .. } if still_bound == &vec![port]
    )));
    assert!(
        seen.iter()
            .any(|e| matches!(e, ServiceEvent::ServiceStopped { .. }))
    );
    drop(holder);
    Ok(())
}

#[tokio::test]
async fn test_unmonitored_endpoint_skips_port_checks() -> TestResult {
    init_tracing();
    let executor = fast_port_checks(2);
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new("web", &format!("echo 'on http://localhost:9502'; {LONG}"))
        .endpoint_on("up", r"on (http://\S+)", "web", "http://localhost", 1, false)
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    let report = with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;

    assert!(report.ports.is_none());
    assert!(
        !drain(&mut events)
            .iter()
            .any(|e| matches!(e, ServiceEvent::CheckingPortRelease { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn test_unexpected_exit_is_reported_and_removed() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new("flaky", "echo ready; sleep 0.3; exit 7")
        .ready_on("ready", "^ready$")
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert!(handle.is_running());

    let seen = collect_until(&mut events, Duration::from_secs(5), |e| {
        matches!(e, ServiceEvent::ServiceExited { .. })
    })
    .await;

    match seen.last() {
        Some(ServiceEvent::ServiceExited { service_id, exit }) => {
            assert_eq!(service_id, &handle.id);
            assert_eq!(exit.and_then(|e| e.code), Some(7));
        }
        other => panic!("expected ServiceExited, got {other:?}"),
    }
    assert!(matches!(
        executor.get(&handle.id),
        Err(ProctorError::ServiceNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_exit_during_boot_is_a_failure() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new("crashy", "echo 'config missing' >&2; exit 3")
        .ready_on("ready", "listening")
        .build();

    let handle = with_timeout(executor.start(task)).await?;

    assert_eq!(handle.status, ServiceStatus::Failed);
    assert!(executor.list().is_empty());
    let reason = drain(&mut events).into_iter().find_map(|e| match e {
        ServiceEvent::ServiceFailed { reason, .. } => Some(reason),
        _ => None,
    });
    let reason = reason.ok_or("service failed event")?;
    assert!(reason.contains("exit code 3"), "reason: {reason}");
    Ok(())
}

#[tokio::test]
async fn test_spawn_failure_yields_failed_handle() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceTask::new("ghost", "/definitely/not/a/real/binary");

    let handle = with_timeout(executor.start(task)).await?;

    assert_eq!(handle.status, ServiceStatus::Failed);
    assert_eq!(handle.pid, None);
    assert!(executor.list().is_empty());
    let seen = drain(&mut events);
    assert_eq!(seen.len(), 1);
    assert!(matches!(seen[0], ServiceEvent::ServiceFailed { .. }));
    Ok(())
}

#[tokio::test]
async fn test_invalid_descriptor_is_rejected_before_spawn() {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();

    let err = with_timeout(executor.start(ServiceTask::new("blank", "   ")))
        .await
        .unwrap_err();
    assert!(err.is_validation(), "got {err:?}");

    let bad_regex = ServiceBuilder::new("bad", LONG).ready_on("broken", "(").build();
    let err = with_timeout(executor.start(bad_regex)).await.unwrap_err();
    assert!(err.is_validation(), "got {err:?}");

    let dangerous = ServiceTask::new("nope", "rm").args(["-rf", "/"]);
    let err = with_timeout(executor.start(dangerous)).await.unwrap_err();
    assert!(err.is_validation(), "got {err:?}");

    assert!(drain(&mut events).is_empty());
    assert!(executor.list().is_empty());
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    init_tracing();
    let executor = ServiceExecutor::default();

    assert!(matches!(
        executor.get("missing"),
        Err(ProctorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        executor.logs("missing", None),
        Err(ProctorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        with_timeout(executor.stop("missing", StopOptions::graceful())).await,
        Err(ProctorError::ServiceNotFound(_))
    ));
    assert!(matches!(
        with_timeout(executor.restart("missing")).await,
        Err(ProctorError::ServiceNotFound(_))
    ));
}

#[tokio::test]
async fn test_second_stop_is_not_found() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let handle = with_timeout(executor.start(ServiceBuilder::new("s", LONG).build())).await?;

    let (first, second) = with_timeout(async {
        tokio::join!(
            executor.stop(&handle.id, StopOptions::graceful()),
            executor.stop(&handle.id, StopOptions::graceful()),
        )
    })
    .await;

    let oks = [first.is_ok(), second.is_ok()];
    assert_eq!(oks.iter().filter(|ok| **ok).count(), 1, "{oks:?}");
    Ok(())
}

#[tokio::test]
async fn test_stop_while_booting_reports_boot_timeout_first() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let mut events = executor.subscribe();
    let task = ServiceBuilder::new("slow", LONG)
        .ready_on("never", "never printed")
        .readiness_timeout(Duration::from_secs(30))
        .build();

    let starter = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.start(task).await })
    };

    let seen = collect_until(&mut events, Duration::from_secs(5), |e| {
        matches!(e, ServiceEvent::ServiceStarted { .. })
    })
    .await;
    let id = seen
        .last()
        .map(|e| e.service_id().to_string())
        .ok_or("service started event")?;

    with_timeout(executor.stop(&id, StopOptions::graceful())).await?;
    let handle = with_timeout(starter).await??;
    assert_ne!(handle.status, ServiceStatus::Booting);

    let seen = drain(&mut events);
    let timed_out = seen
        .iter()
        .position(|e| matches!(e, ServiceEvent::BootTimeout { .. }));
    let stopping = seen
        .iter()
        .position(|e| matches!(e, ServiceEvent::ServiceStopping { .. }));
    assert!(timed_out.is_some());
    assert!(timed_out < stopping);
    Ok(())
}

#[tokio::test]
async fn test_restart_creates_a_new_instance() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("api", &format!("echo ready; {LONG}"))
        .ready_on("ready", "^ready$")
        .build();

    let first = with_timeout(executor.start(task)).await?;
    let second = with_timeout(executor.restart(&first.id)).await?;

    assert_ne!(first.id, second.id);
    assert_ne!(first.pid, second.pid);
    assert_eq!(first.task_id, second.task_id);
    assert!(second.is_running());
    assert!(matches!(
        executor.get(&first.id),
        Err(ProctorError::ServiceNotFound(_))
    ));
    assert_eq!(executor.list().len(), 1);

    with_timeout(executor.stop(&second.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_services_are_isolated() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let svc = |name: &str| {
        ServiceBuilder::new(name, &format!("echo '{name} ready'; {LONG}"))
            .ready_on("ready", &format!("^{name} ready$"))
            .build()
    };

    let (a, b, c) = with_timeout(async {
        tokio::join!(
            executor.start(svc("alpha")),
            executor.start(svc("beta")),
            executor.start(svc("gamma")),
        )
    })
    .await;
    let (a, b, c) = (a?, b?, c?);

    let listed = executor.list();
    assert_eq!(listed.len(), 3);
    let mut ids: Vec<&str> = listed.iter().map(|h| h.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    with_timeout(executor.stop(&b.id, StopOptions::graceful())).await?;

    let remaining: Vec<String> = executor.list().into_iter().map(|h| h.id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&a.id));
    assert!(remaining.contains(&c.id));

    let alpha_logs = executor.logs(&a.id, None)?;
    assert_eq!(alpha_logs.len(), 1);
    assert_eq!(alpha_logs[0].line, "alpha ready");
    assert_eq!(alpha_logs[0].stream, OutputStream::Stdout);
    let gamma_logs = executor.logs(&c.id, None)?;
    assert_eq!(gamma_logs[0].line, "gamma ready");

    let results = with_timeout(executor.stop_all()).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(Result::is_ok));
    assert!(executor.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_log_ring_keeps_most_recent_lines() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::new(ServiceExecutorConfig {
        log_capacity: 5,
        ..ServiceExecutorConfig::default()
    });
    let script = format!(
        "i=1; while [ $i -le 20 ]; do echo line$i; i=$((i+1)); done; echo ready; {LONG}"
    );
    let task = ServiceBuilder::new("chatty", &script)
        .ready_on("ready", "^ready$")
        .build();

    let handle = with_timeout(executor.start(task)).await?;

    let lines: Vec<String> = executor
        .logs(&handle.id, None)?
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert_eq!(lines, vec!["line17", "line18", "line19", "line20", "ready"]);

    let tail: Vec<String> = executor
        .logs(&handle.id, Some(2))?
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert_eq!(tail, vec!["line20", "ready"]);

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_stderr_lines_are_logged_and_matched() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::default();
    let task = ServiceBuilder::new("err", &format!("echo 'ready on stderr' >&2; {LONG}"))
        .ready_on("ready", "ready on stderr")
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert!(handle.is_running());

    let logs = executor.logs(&handle.id, None)?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].stream, OutputStream::Stderr);

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_all_on_empty_registry_is_a_no_op() {
    init_tracing();
    let executor = ServiceExecutor::default();
    assert!(with_timeout(executor.stop_all()).await.is_empty());
}

#[tokio::test]
async fn test_overlong_lines_are_split_at_the_cap() -> TestResult {
    init_tracing();
    let executor = ServiceExecutor::new(ServiceExecutorConfig {
        max_line_bytes: 1024,
        ..ServiceExecutorConfig::default()
    });
    let script = format!("head -c 200000 /dev/zero | tr '\\0' a; echo; echo ready; {LONG}");
    let task = ServiceBuilder::new("wide", &script)
        .ready_on("ready", "^ready$")
        .build();

    let handle = with_timeout(executor.start(task)).await?;
    assert_eq!(handle.status, ServiceStatus::Running);

    let lines: Vec<String> = executor
        .logs(&handle.id, None)?
        .into_iter()
        .map(|l| l.line)
        .collect();
    assert!(lines.iter().all(|l| l.len() <= 1024));
    assert_eq!(lines.last().map(String::as_str), Some("ready"));
    let captured: usize = lines[..lines.len() - 1].iter().map(String::len).sum();
    assert_eq!(captured, 200_000);

    with_timeout(executor.stop(&handle.id, StopOptions::graceful())).await?;
    Ok(())
}

#[tokio::test]
async fn test_exit_right_after_readiness_line_counts_as_ready() -> TestResult {
    init_tracing();

    for _ in 0..5 {
        let executor = ServiceExecutor::default();
        let mut events = executor.subscribe();
        let task = ServiceBuilder::new("oneshot", "echo ready; exit 0")
            .ready_on("ready", "^ready$")
            .build();

        let handle = with_timeout(executor.start(task)).await?;
        assert_ne!(handle.status, ServiceStatus::Failed);

        let seen = collect_until(&mut events, Duration::from_secs(5), |e| e.is_final()).await;
        assert!(
            seen.iter()
                .any(|e| matches!(e, ServiceEvent::ServiceReady { .. }))
        );
        assert!(matches!(seen.last(), Some(ServiceEvent::ServiceExited { .. })), "{seen:?}");
    }
    Ok(())
}
