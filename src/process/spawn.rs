// src/process/spawn.rs

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::process::signal::{self, SignalDelivery, SignalTarget};
use crate::task::ProcessSpec;
use crate::types::ShutdownSignal;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    /// Terminating signal number, Unix only.
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Used when waiting on the child itself failed.
    fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// Exit code, or `-1` when the process was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Resolves once the supervisor task has reaped the child.
#[derive(Debug, Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<Option<ExitInfo>>,
}

impl ExitWatch {
    pub fn current(&self) -> Option<ExitInfo> {
        *self.rx.borrow()
    }

    /// Wait for the exit. `None` only if the supervisor vanished without
    /// reporting, which happens when the runtime shuts down.
    pub async fn wait(&mut self) -> Option<ExitInfo> {
        let waited = self.rx.wait_for(Option::is_some).await.map(|v| *v);
        match waited {
            Ok(info) => info,
            Err(_) => *self.rx.borrow(),
        }
    }
}

/// Sends signals to a supervised child without owning it.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    pid: Option<u32>,
    grouped: bool,
    kill_tx: mpsc::UnboundedSender<()>,
}

impl ProcessControl {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Deliver `signal` to the child's group (or the child alone).
    pub fn signal(&self, signal: ShutdownSignal) -> io::Result<SignalDelivery> {
        let pid = self
            .pid
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has no pid"))?;

        let target = if self.grouped {
            signal::signal_tree(pid, signal)?
        } else {
            signal::signal_process(pid, signal)?;
            SignalTarget::Process
        };
        Ok(SignalDelivery { signal, target })
    }

    /// SIGKILL the group; if that cannot be delivered, ask the supervisor to
    /// kill the direct child through tokio.
    pub fn force_kill(&self) -> SignalDelivery {
        match self.signal(ShutdownSignal::Kill) {
            Ok(delivery) => delivery,
            Err(err) => {
                debug!(pid = ?self.pid, error = %err, "kill signal failed; using runtime kill");
                let _ = self.kill_tx.send(());
                SignalDelivery {
                    signal: ShutdownSignal::Kill,
                    target: SignalTarget::Runtime,
                }
            }
        }
    }
}

/// A freshly spawned child with its pipes detached.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
    pub exit: ExitWatch,
    pub control: ProcessControl,
}

/// Spawn `spec` with piped stdout/stderr and a null stdin.
///
/// With `own_group`, the child becomes the leader of a new process group on
/// Unix. The `Child` moves into a supervisor task that reaps it and
/// publishes the [`ExitInfo`] on the returned [`ExitWatch`].
pub fn spawn_process(spec: &ProcessSpec, own_group: bool) -> io::Result<SpawnedProcess> {
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    #[cfg(unix)]
    {
        if own_group {
            cmd.process_group(0);
        }
    }
    let grouped = cfg!(unix) && own_group;

    let mut child = cmd.spawn()?;
    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (exit_tx, exit_rx) = watch::channel(None);
    let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        let mut kill_open = true;
        let waited = loop {
            tokio::select! {
                status = child.wait() => break status,
                req = kill_rx.recv(), if kill_open => match req {
                    Some(()) => {
                        if let Err(e) = child.start_kill() {
                            warn!(pid = ?pid, error = %e, "failed to kill child process");
                        }
                    }
                    None => kill_open = false,
                },
            }
        };

        let info = match waited {
            Ok(status) => ExitInfo::from_status(status),
            Err(e) => {
                warn!(pid = ?pid, error = %e, "waiting on child process failed");
                ExitInfo::unknown()
            }
        };
        debug!(pid = ?pid, code = ?info.code, signal = ?info.signal, "child process reaped");
        let _ = exit_tx.send(Some(info));
    });

    Ok(SpawnedProcess {
        pid,
        stdout,
        stderr,
        exit: ExitWatch { rx: exit_rx },
        control: ProcessControl {
            pid,
            grouped,
            kill_tx,
        },
    })
}
