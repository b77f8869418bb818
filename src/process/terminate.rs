// src/process/terminate.rs

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::process::signal::SignalDelivery;
use crate::process::spawn::{ExitInfo, ExitWatch, ProcessControl};
use crate::types::ShutdownSignal;

/// Progress reported while [`terminate`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStep {
    /// The requested signal was delivered.
    SignalSent(SignalDelivery),
    /// The grace period ran out (or the signal could not be delivered) and a
    /// kill was issued.
    ForceKilled(SignalDelivery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationReport {
    /// `None` if the process still had not been reaped after the post-kill
    /// wait.
    pub exit: Option<ExitInfo>,
    pub graceful: Option<SignalDelivery>,
    pub forced: Option<SignalDelivery>,
}

impl TerminationReport {
    pub fn was_forced(&self) -> bool {
        self.forced.is_some()
    }
}

/// Send `signal`, wait up to `grace` for the exit, then kill.
///
/// Always resolves: either the exit was observed, or a kill was issued and
/// at most `kill_wait` was spent waiting for the reap. Passing
/// [`ShutdownSignal::Kill`] skips the graceful phase.
pub async fn terminate(
    control: &ProcessControl,
    exit: &mut ExitWatch,
    signal: ShutdownSignal,
    grace: Duration,
    kill_wait: Duration,
    on_step: &mut (dyn FnMut(TerminationStep) + Send),
) -> TerminationReport {
    if let Some(info) = exit.current() {
        debug!(pid = ?control.pid(), "process already exited; nothing to terminate");
        return TerminationReport {
            exit: Some(info),
            graceful: None,
            forced: None,
        };
    }

    let mut graceful = None;
    if signal != ShutdownSignal::Kill {
        match control.signal(signal) {
            Ok(delivery) => {
                debug!(pid = ?control.pid(), signal = %signal, target = ?delivery.target, "sent shutdown signal");
                on_step(TerminationStep::SignalSent(delivery));
                graceful = Some(delivery);

                if let Ok(info) = timeout(grace, exit.wait()).await {
                    return TerminationReport {
                        exit: info,
                        graceful,
                        forced: None,
                    };
                }
                info!(
                    pid = ?control.pid(),
                    signal = %signal,
                    grace_ms = grace.as_millis() as u64,
                    "process ignored shutdown signal; escalating to kill"
                );
            }
            Err(e) => {
                warn!(pid = ?control.pid(), signal = %signal, error = %e, "could not deliver shutdown signal; killing");
            }
        }
    }

    let forced = control.force_kill();
    on_step(TerminationStep::ForceKilled(forced));

    let exit = match timeout(kill_wait, exit.wait()).await {
        Ok(info) => info,
        Err(_) => {
            warn!(pid = ?control.pid(), "process not reaped after kill");
            None
        }
    };

    TerminationReport {
        exit,
        graceful,
        forced: Some(forced),
    }
}
