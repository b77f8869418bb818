// src/exec/command.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{ProctorError, Result};
use crate::events::EventBus;
use crate::exec::events::{CommandEvent, RetryReason};
use crate::exec::result::CommandResult;
use crate::exec::stream::{StreamHandlers, StreamSink, pump};
use crate::process::buffer::CappedBuffer;
use crate::process::spawn::{ExitInfo, ExitWatch, ProcessControl, SpawnedProcess, spawn_process};
use crate::process::terminate::{TerminationStep, terminate};
use crate::process::validate::validate_process;
use crate::task::CommandTask;
use crate::types::{OutputStream, OverflowPolicy, ShutdownSignal};

pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_KILL_WAIT: Duration = Duration::from_secs(2);

/// How long collectors may keep reading after the process exited. A
/// background grandchild can hold the pipes open indefinitely.
const READER_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Tuning knobs shared by every command run through one executor.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandExecutorConfig {
    /// Per-stream capture limit.
    pub max_output_bytes: usize,
    pub overflow: OverflowPolicy,
    /// Used when the task's retry policy has no delay of its own.
    pub retry_delay: Duration,
    /// Used when the task's retry policy has no exit codes of its own.
    pub retryable_exit_codes: Vec<i32>,
    /// Bounded wait for the reap after a forced kill.
    pub kill_wait: Duration,
}

impl Default for CommandExecutorConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            overflow: OverflowPolicy::Pause,
            retry_delay: DEFAULT_RETRY_DELAY,
            retryable_exit_codes: Vec::new(),
            kill_wait: DEFAULT_KILL_WAIT,
        }
    }
}

/// What one attempt produced.
struct AttemptOutcome {
    exit: Option<ExitInfo>,
    timed_out: bool,
    stdout: String,
    stderr: String,
}

impl AttemptOutcome {
    fn exit_code(&self) -> i32 {
        self.exit.map(|e| e.exit_code()).unwrap_or(-1)
    }
}

/// Runs finite commands. Cheap to clone; clones share the event bus.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    config: CommandExecutorConfig,
    events: EventBus<CommandEvent>,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &CommandExecutorConfig {
        &self.config
    }

    /// Receive every [`CommandEvent`] emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CommandEvent> {
        self.events.subscribe()
    }

    pub async fn execute(&self, task: &CommandTask) -> Result<CommandResult> {
        self.execute_with_stream(task, StreamHandlers::default())
            .await
    }

    /// Like [`execute`](Self::execute), additionally calling `handlers` for
    /// every output chunk of every attempt.
    pub async fn execute_with_stream(
        &self,
        task: &CommandTask,
        handlers: StreamHandlers,
    ) -> Result<CommandResult> {
        validate_process(&task.process)?;

        let max_attempts = task.retry.max_attempts();
        let delay = task.retry.delay.unwrap_or(self.config.retry_delay);
        let retryable: &[i32] = task
            .retry
            .retryable_exit_codes
            .as_deref()
            .unwrap_or(&self.config.retryable_exit_codes);

        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(
                task = %task.id(),
                title = %task.title(),
                attempt,
                max_attempts,
                cmd = %task.process.command_line(),
                "starting command attempt"
            );
            self.events.emit(CommandEvent::AttemptStarted {
                task_id: task.id().to_string(),
                attempt,
                max_attempts,
            });

            let outcome = match self.run_attempt(task, attempt, &handlers).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.emit_completed(task, attempt, None, false, false, started);
                    return Err(err);
                }
            };

            let reason = if outcome.timed_out {
                RetryReason::Timeout
            } else {
                let code = outcome.exit_code();
                if code == 0 {
                    self.emit_completed(task, attempt, Some(0), false, true, started);
                    return Ok(self.result(outcome, attempt, started));
                }
                RetryReason::ExitCode(code)
            };

            let retryable_failure = match reason {
                RetryReason::Timeout => true,
                RetryReason::ExitCode(code) => retryable.contains(&code),
            };

            if retryable_failure && attempt < max_attempts {
                warn!(
                    task = %task.id(),
                    attempt,
                    reason = ?reason,
                    delay_ms = delay.as_millis() as u64,
                    "command attempt failed; retrying"
                );
                self.events.emit(CommandEvent::RetryScheduled {
                    task_id: task.id().to_string(),
                    next_attempt: attempt + 1,
                    delay,
                    reason,
                });
                sleep(delay).await;
                continue;
            }

            return match reason {
                RetryReason::Timeout => {
                    self.emit_completed(task, attempt, None, true, false, started);
                    Err(ProctorError::TimeoutError {
                        timeout: task.timeout.unwrap_or_default(),
                        attempts: attempt,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                    })
                }
                RetryReason::ExitCode(code) if task.ignore_exit_code => {
                    debug!(task = %task.id(), exit_code = code, "ignoring non-zero exit code");
                    self.emit_completed(task, attempt, Some(code), false, true, started);
                    Ok(self.result(outcome, attempt, started))
                }
                RetryReason::ExitCode(code) => {
                    self.emit_completed(task, attempt, Some(code), false, false, started);
                    Err(ProctorError::ProcessError {
                        exit_code: code,
                        stdout: outcome.stdout,
                        stderr: outcome.stderr,
                        attempts: attempt,
                    })
                }
            };
        }
    }

    async fn run_attempt(
        &self,
        task: &CommandTask,
        attempt: u32,
        handlers: &StreamHandlers,
    ) -> Result<AttemptOutcome> {
        let SpawnedProcess {
            pid,
            stdout,
            stderr,
            mut exit,
            control,
        } = spawn_process(&task.process, true).map_err(|source| ProctorError::SpawnError {
            program: task.process.command.clone(),
            source,
        })?;

        debug!(task = %task.id(), attempt, pid = ?pid, "command process started");
        self.events.emit(CommandEvent::ProcessStarted {
            task_id: task.id().to_string(),
            attempt,
            pid,
        });

        // Killed on drop unless the exit is observed, so a cancelled call
        // leaves no process group behind.
        let mut guard = KillOnDrop::new(control.clone(), exit.clone());

        let out = self.attach(task, attempt, OutputStream::Stdout, handlers, stdout);
        let err = self.attach(task, attempt, OutputStream::Stderr, handlers, stderr);

        let timed_out = match task.timeout {
            Some(limit) => timeout(limit, exit.wait()).await.is_err(),
            None => {
                exit.wait().await;
                false
            }
        };

        let exit_info = if timed_out {
            warn!(
                task = %task.id(),
                attempt,
                pid = ?pid,
                timeout_ms = task.timeout.unwrap_or_default().as_millis() as u64,
                "command timed out; killing process group"
            );
            let report = terminate(
                &control,
                &mut exit,
                ShutdownSignal::Kill,
                Duration::ZERO,
                self.config.kill_wait,
                &mut |_: TerminationStep| {},
            )
            .await;
            report.exit
        } else {
            exit.current()
        };
        guard.disarm();

        let stdout = out.finish().await;
        let stderr = err.finish().await;

        info!(
            task = %task.id(),
            attempt,
            exit_code = ?exit_info.and_then(|e| e.code),
            signal = ?exit_info.and_then(|e| e.signal),
            timed_out,
            "command process exited"
        );

        Ok(AttemptOutcome {
            exit: exit_info,
            timed_out,
            stdout,
            stderr,
        })
    }

    fn attach<R>(
        &self,
        task: &CommandTask,
        attempt: u32,
        stream: OutputStream,
        handlers: &StreamHandlers,
        reader: Option<R>,
    ) -> Collector<R>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        // Pausing only makes sense when a timer will eventually end the
        // blocked writer.
        let overflow = match (self.config.overflow, task.timeout) {
            (OverflowPolicy::Pause, None) => OverflowPolicy::Drain,
            (policy, _) => policy,
        };

        let buffer = handlers
            .accumulate
            .then(|| Arc::new(Mutex::new(CappedBuffer::new(self.config.max_output_bytes))));

        let handle = reader.map(|reader| {
            let sink = StreamSink {
                task_id: task.id().to_string(),
                attempt,
                stream,
                buffer: buffer.clone(),
                handler: handlers.handler_for(stream),
                overflow,
                events: self.events.clone(),
            };
            tokio::spawn(pump(reader, sink))
        });

        Collector { buffer, handle }
    }

    fn result(&self, outcome: AttemptOutcome, attempt: u32, started: Instant) -> CommandResult {
        CommandResult {
            exit_code: outcome.exit_code(),
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timed_out: false,
            duration: started.elapsed(),
            retry_count: attempt - 1,
        }
    }

    fn emit_completed(
        &self,
        task: &CommandTask,
        attempts: u32,
        exit_code: Option<i32>,
        timed_out: bool,
        success: bool,
        started: Instant,
    ) {
        self.events.emit(CommandEvent::Completed {
            task_id: task.id().to_string(),
            attempts,
            exit_code,
            timed_out,
            success,
            duration: started.elapsed(),
        });
    }
}

/// Force-kills the process group when dropped while still armed.
struct KillOnDrop {
    control: ProcessControl,
    exit: ExitWatch,
    armed: bool,
}

impl KillOnDrop {
    fn new(control: ProcessControl, exit: ExitWatch) -> Self {
        Self {
            control,
            exit,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if self.armed && self.exit.current().is_none() {
            warn!(pid = ?self.control.pid(), "command cancelled while running; killing process group");
            self.control.force_kill();
        }
    }
}

/// A running stream pump plus the buffer it fills.
struct Collector<R> {
    buffer: Option<Arc<Mutex<CappedBuffer>>>,
    handle: Option<JoinHandle<Option<R>>>,
}

impl<R> Collector<R> {
    /// Wait briefly for the pump to hit EOF, then return what was captured.
    /// A paused reader is dropped here, closing our end of the pipe.
    async fn finish(self) -> String {
        if let Some(mut handle) = self.handle {
            if timeout(READER_DRAIN_GRACE, &mut handle).await.is_err() {
                debug!("output pipe still open after exit; abandoning reader");
                handle.abort();
            }
        }
        self.buffer
            .map(|b| b.lock().as_str().to_string())
            .unwrap_or_default()
    }
}
