// src/service/mod.rs

//! Long-running service supervision.
//!
//! [`ServiceExecutor`] spawns each service as the leader of its own process
//! group, detects readiness by matching output lines against the
//! descriptor's patterns, keeps a ring-buffered log and reports lifecycle
//! changes as [`ServiceEvent`]s. Stopping is graceful first, forced after
//! the grace period, and followed by port-release verification.

pub mod events;
pub mod executor;
pub mod handle;
pub mod readiness;

pub use events::ServiceEvent;
pub use executor::{ServiceExecutor, ServiceExecutorConfig};
pub use handle::{ServiceHandle, StopOptions, StopReport};
pub use readiness::{ReadinessMatch, ReadinessMatcher, port_of, synthesize_url};
