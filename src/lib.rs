// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod process;
pub mod runner;
pub mod service;
pub mod task;
pub mod types;

use anyhow::Result;
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::runner::{RunOptions, run_config};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the command and service executors
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    run_config(cfg, RunOptions { once: args.once }).await
}

/// Simple dry-run output: print executor settings and descriptors.
fn print_dry_run(cfg: &ConfigFile) {
    println!("proctor dry-run");
    println!(
        "  executor.max_output_bytes = {}",
        cfg.command_executor.max_output_bytes
    );
    println!("  executor.overflow = {:?}", cfg.command_executor.overflow);
    println!("  executor.retry_delay = {:?}", cfg.command_executor.retry_delay);
    if !cfg.command_executor.retryable_exit_codes.is_empty() {
        println!(
            "  executor.retryable_exit_codes = {:?}",
            cfg.command_executor.retryable_exit_codes
        );
    }
    println!("  executor.log_capacity = {}", cfg.service_executor.log_capacity);
    println!(
        "  executor.port_check = {} x {:?}",
        cfg.service_executor.port_check_retries, cfg.service_executor.port_check_interval
    );
    println!();

    println!("commands ({}):", cfg.commands.len());
    for task in &cfg.commands {
        println!("  - {}", task.title());
        println!("      cmd: {}", task.process.command_line());
        if let Some(cwd) = &task.process.cwd {
            println!("      cwd: {}", cwd.display());
        }
        if let Some(timeout) = task.timeout {
            println!("      timeout: {timeout:?}");
        }
        if task.retry.max_attempts() > 1 {
            println!("      attempts: {}", task.retry.max_attempts());
        }
        if task.ignore_exit_code {
            println!("      ignore_exit_code: true");
        }
    }
    println!();

    println!("services ({}):", cfg.services.len());
    for task in &cfg.services {
        println!("  - {}", task.title());
        println!("      cmd: {}", task.process.command_line());
        println!(
            "      shutdown: {} after {:?}",
            task.graceful_shutdown.signal, task.graceful_shutdown.timeout
        );
        println!("      readiness timeout: {:?}", task.readiness.timeout);
        for pattern in &task.readiness.patterns {
            println!("      pattern {}: {}", pattern.name, pattern.regex);
            for ep in &pattern.endpoints {
                println!(
                    "        endpoint {} <- {} (group {}{})",
                    ep.endpoint_name,
                    ep.default_host_url,
                    ep.capture_group,
                    if ep.monitor_port_release_on_termination {
                        ", port monitored"
                    } else {
                        ""
                    }
                );
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
