// tests/terminate.rs

#![cfg(unix)]

use std::error::Error;
use std::time::Duration;

use proctor::process::{SignalTarget, TerminationStep, spawn_process, terminate};
use proctor::task::ProcessSpec;
use proctor::types::ShutdownSignal;
use proctor_test_utils::{init_tracing, process_gone, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const KILL_WAIT: Duration = Duration::from_secs(2);

fn sh(script: &str) -> ProcessSpec {
    let mut spec = ProcessSpec::new("sh");
    spec.args = vec!["-c".to_string(), script.to_string()];
    spec
}

#[tokio::test]
async fn test_graceful_signal_reaches_the_group() -> TestResult {
    init_tracing();
    let spawned = spawn_process(&sh("exec sleep 30"), true)?;
    let mut exit = spawned.exit.clone();
    let mut steps = Vec::new();

    let report = with_timeout(terminate(
        &spawned.control,
        &mut exit,
        ShutdownSignal::Term,
        Duration::from_secs(2),
        KILL_WAIT,
        &mut |step: TerminationStep| steps.push(step),
    ))
    .await;

    assert!(!report.was_forced());
    let graceful = report.graceful.ok_or("graceful delivery")?;
    assert_eq!(graceful.target, SignalTarget::Group);
    assert_eq!(graceful.signal, ShutdownSignal::Term);
    assert!(report.exit.is_some());
    assert_eq!(steps, vec![TerminationStep::SignalSent(graceful)]);
    Ok(())
}

#[tokio::test]
async fn test_ignored_signal_is_escalated_after_grace() -> TestResult {
    init_tracing();
    let spawned = spawn_process(
        &sh("trap '' TERM; while true; do sleep 0.1; done"),
        true,
    )?;
    let pid = spawned.pid.ok_or("pid")?;
    let mut exit = spawned.exit.clone();
    let mut steps = Vec::new();

    // Give the shell a moment to install the trap.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = with_timeout(terminate(
        &spawned.control,
        &mut exit,
        ShutdownSignal::Term,
        Duration::from_millis(200),
        KILL_WAIT,
        &mut |step: TerminationStep| steps.push(step),
    ))
    .await;

    assert!(report.was_forced());
    assert_eq!(steps.len(), 2);
    assert!(matches!(steps[0], TerminationStep::SignalSent(_)));
    assert!(matches!(steps[1], TerminationStep::ForceKilled(_)));
    assert_eq!(report.exit.and_then(|e| e.code), None);
    assert!(process_gone(pid));
    Ok(())
}

#[tokio::test]
async fn test_kill_skips_the_graceful_phase() -> TestResult {
    init_tracing();
    let spawned = spawn_process(&sh("exec sleep 30"), true)?;
    let mut exit = spawned.exit.clone();
    let mut steps = Vec::new();

    let report = with_timeout(terminate(
        &spawned.control,
        &mut exit,
        ShutdownSignal::Kill,
        Duration::from_secs(30),
        KILL_WAIT,
        &mut |step: TerminationStep| steps.push(step),
    ))
    .await;

    assert!(report.graceful.is_none());
    assert!(report.was_forced());
    assert_eq!(steps.len(), 1);
    assert!(matches!(steps[0], TerminationStep::ForceKilled(_)));
    assert_eq!(report.exit.map(|e| e.exit_code()), Some(-1));
    Ok(())
}

#[tokio::test]
async fn test_already_exited_process_is_left_alone() -> TestResult {
    init_tracing();
    let spawned = spawn_process(&sh("exit 2"), true)?;
    let mut exit = spawned.exit.clone();
    let observed = with_timeout(exit.wait()).await;
    assert_eq!(observed.and_then(|e| e.code), Some(2));

    let mut steps = Vec::new();
    let report = with_timeout(terminate(
        &spawned.control,
        &mut exit,
        ShutdownSignal::Term,
        Duration::from_secs(1),
        KILL_WAIT,
        &mut |step: TerminationStep| steps.push(step),
    ))
    .await;

    assert!(steps.is_empty());
    assert!(!report.was_forced());
    assert_eq!(report.exit, observed);
    Ok(())
}
