// src/runner.rs

//! Drives a validated [`ConfigFile`]: commands first, in order, then the
//! services, until Ctrl-C (or right after boot with `--once`).

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::exec::{CommandExecutor, StreamHandlers};
use crate::service::{ServiceEvent, ServiceExecutor, ServiceHandle};
use crate::types::{OutputStream, ServiceStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop services right after they booted.
    pub once: bool,
}

pub async fn run_config(cfg: ConfigFile, options: RunOptions) -> Result<()> {
    let commands = CommandExecutor::new(cfg.command_executor.clone());
    let services = ServiceExecutor::new(cfg.service_executor.clone());

    let printer = tokio::spawn(print_service_output(services.subscribe()));
    let mut lifecycle = services.subscribe();

    let outcome = tokio::select! {
        res = run_all(&commands, &services, &cfg, options, &mut lifecycle) => res,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("interrupted; shutting down");
            Ok(())
        }
    };

    shutdown(&services).await;
    printer.abort();
    outcome
}

async fn run_all(
    commands: &CommandExecutor,
    services: &ServiceExecutor,
    cfg: &ConfigFile,
    options: RunOptions,
    lifecycle: &mut mpsc::UnboundedReceiver<ServiceEvent>,
) -> Result<()> {
    for task in &cfg.commands {
        let handlers = StreamHandlers::new()
            .on_stdout(|chunk| {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            })
            .on_stderr(|chunk| eprint!("{chunk}"))
            .accumulate(false);

        let result = commands
            .execute_with_stream(task, handlers)
            .await
            .with_context(|| format!("command '{}' failed", task.title()))?;
        info!(
            title = %task.title(),
            exit_code = result.exit_code,
            attempts = result.attempts(),
            duration_ms = result.duration.as_millis() as u64,
            "command finished"
        );
    }

    let mut started: Vec<ServiceHandle> = Vec::with_capacity(cfg.services.len());
    for task in &cfg.services {
        let title = task.title().to_string();
        let handle = services.start(task.clone()).await?;
        if handle.status == ServiceStatus::Failed {
            bail!("service '{title}' failed to start");
        }
        print_handle(&handle);
        started.push(handle);
    }

    if started.is_empty() || options.once {
        return Ok(());
    }

    info!(count = started.len(), "services running; press Ctrl+C to stop");
    wait_until_all_gone(services, lifecycle).await;
    Ok(())
}

/// Resolve once no service is registered any more.
async fn wait_until_all_gone(
    services: &ServiceExecutor,
    lifecycle: &mut mpsc::UnboundedReceiver<ServiceEvent>,
) {
    while !services.list().is_empty() {
        match lifecycle.recv().await {
            Some(event) if event.is_final() => {
                debug!(service = %event.service_id(), "service left the registry");
            }
            Some(_) => {}
            None => break,
        }
    }
    warn!("all services have exited");
}

async fn shutdown(services: &ServiceExecutor) {
    for result in services.stop_all().await {
        match result {
            Ok(report) => {
                if let Some(ports) = report.ports.filter(|p| !p.all_released()) {
                    warn!(service = %report.id, still_bound = ?ports.still_bound, "ports still bound after stop");
                }
            }
            Err(e) => debug!(error = %e, "service was already gone"),
        }
    }
}

fn print_handle(handle: &ServiceHandle) {
    println!("service '{}' {} (pid {:?})", handle.title, handle.status, handle.pid);
    for (name, url) in &handle.endpoints {
        println!("  {name}: {url}");
    }
}

/// Echo every service output line, prefixed with the service title.
async fn print_service_output(mut events: mpsc::UnboundedReceiver<ServiceEvent>) {
    let mut titles: HashMap<String, String> = HashMap::new();

    while let Some(event) = events.recv().await {
        match event {
            ServiceEvent::ServiceStarted { service_id, title } => {
                titles.insert(service_id, title);
            }
            ServiceEvent::Output {
                service_id,
                stream,
                line,
            } => {
                let title = titles.get(&service_id).map(String::as_str).unwrap_or("?");
                match stream {
                    OutputStream::Stdout => println!("[{title}] {line}"),
                    OutputStream::Stderr => eprintln!("[{title}] {line}"),
                }
            }
            ServiceEvent::ServiceStopped { service_id, .. }
            | ServiceEvent::ServiceExited { service_id, .. }
            | ServiceEvent::ServiceFailed { service_id, .. } => {
                titles.remove(&service_id);
            }
            _ => {}
        }
    }
}
