// src/process/signal.rs

//! Signal delivery, abstracted over the platform.
//!
//! On Unix every supervised child leads its own process group, so a signal
//! sent to the group reaches the child and everything it spawned. Other
//! targets have no graceful signals; callers fall back to the runtime's
//! forced kill of the direct child.

use std::io;

use crate::types::ShutdownSignal;

/// Where a signal ended up being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    /// The whole process group.
    Group,
    /// Only the direct child, after group delivery failed.
    Process,
    /// Forced kill through the tokio child handle.
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDelivery {
    pub signal: ShutdownSignal,
    pub target: SignalTarget,
}

/// Send `signal` to the process group led by `pid`, falling back to `pid`
/// alone if the group cannot be signalled.
pub fn signal_tree(pid: u32, signal: ShutdownSignal) -> io::Result<SignalTarget> {
    match imp::signal_group(pid, signal) {
        Ok(()) => Ok(SignalTarget::Group),
        Err(group_err) => {
            tracing::debug!(pid, signal = %signal, error = %group_err, "group signal failed; signalling process");
            imp::signal_process(pid, signal).map(|()| SignalTarget::Process)
        }
    }
}

pub fn signal_group(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
    imp::signal_group(pid, signal)
}

pub fn signal_process(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
    imp::signal_process(pid, signal)
}

/// Whether a process with this pid still exists (zombies count as alive).
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    imp::is_alive(pid)
}

#[cfg(unix)]
mod imp {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    use crate::types::ShutdownSignal;

    fn to_nix(signal: ShutdownSignal) -> Signal {
        match signal {
            ShutdownSignal::Term => Signal::SIGTERM,
            ShutdownSignal::Int => Signal::SIGINT,
            ShutdownSignal::Hup => Signal::SIGHUP,
            ShutdownSignal::Quit => Signal::SIGQUIT,
            ShutdownSignal::Usr1 => Signal::SIGUSR1,
            ShutdownSignal::Usr2 => Signal::SIGUSR2,
            ShutdownSignal::Kill => Signal::SIGKILL,
        }
    }

    fn pid_of(pid: u32) -> io::Result<Pid> {
        i32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .map(Pid::from_raw)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))
    }

    pub fn signal_group(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
        killpg(pid_of(pid)?, to_nix(signal)).map_err(io::Error::from)
    }

    pub fn signal_process(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
        kill(pid_of(pid)?, to_nix(signal)).map_err(io::Error::from)
    }

    pub fn is_alive(pid: u32) -> bool {
        let Ok(pid) = pid_of(pid) else {
            return false;
        };
        match kill(pid, None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;

    use crate::types::ShutdownSignal;

    pub fn signal_group(_pid: u32, signal: ShutdownSignal) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{signal} is not supported on this platform"),
        ))
    }

    pub fn signal_process(pid: u32, signal: ShutdownSignal) -> io::Result<()> {
        signal_group(pid, signal)
    }
}
