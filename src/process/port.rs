// src/process/port.rs

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::debug;

/// A port is free if a listener can be bound to it on loopback.
///
/// A listener on `0.0.0.0` or `127.0.0.1` makes this return `false`.
pub async fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortReleaseOutcome {
    pub released: Vec<u16>,
    pub still_bound: Vec<u16>,
    /// Number of check rounds performed.
    pub checks: u32,
}

impl PortReleaseOutcome {
    pub fn all_released(&self) -> bool {
        self.still_bound.is_empty()
    }
}

/// Probe `ports` every `interval`, at most `retries` rounds, until all of
/// them are free.
///
/// Never fails: ports that stay bound are reported in `still_bound`.
pub async fn wait_for_release(ports: &[u16], interval: Duration, retries: u32) -> PortReleaseOutcome {
    let retries = retries.max(1);
    let mut pending: Vec<u16> = ports.to_vec();
    pending.sort_unstable();
    pending.dedup();
    let mut released = Vec::with_capacity(pending.len());
    let mut checks = 0;

    while checks < retries && !pending.is_empty() {
        checks += 1;

        let mut still = Vec::with_capacity(pending.len());
        for port in pending.drain(..) {
            if is_port_free(port).await {
                released.push(port);
            } else {
                still.push(port);
            }
        }
        pending = still;

        debug!(check = checks, released = ?released, pending = ?pending, "port release check");

        if !pending.is_empty() && checks < retries {
            sleep(interval).await;
        }
    }

    released.sort_unstable();
    PortReleaseOutcome {
        released,
        still_bound: pending,
        checks,
    }
}
