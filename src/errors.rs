// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The finite-command executor reports every failure through these variants.
//! The service executor only uses them for synchronous problems (validation,
//! unknown ids); everything that happens after `start` returns is reported as
//! a [`crate::service::ServiceEvent`].

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProctorError {
    /// Malformed descriptor. Raised before any process is spawned and never
    /// retried.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The process exited non-zero after all attempts were used up.
    #[error("Process exited with code {exit_code} after {attempts} attempt(s)")]
    ProcessError {
        exit_code: i32,
        stdout: String,
        stderr: String,
        attempts: u32,
    },

    /// The wall-clock budget was exceeded. The process group has already been
    /// killed when this is returned.
    #[error("Command timed out after {timeout:?} ({attempts} attempt(s))")]
    TimeoutError {
        timeout: Duration,
        attempts: u32,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to spawn '{program}': {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProctorError {
    /// Exit code carried by the error, if the process got far enough to
    /// report one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProctorError::ProcessError { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ProctorError::ValidationError(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProctorError::TimeoutError { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProctorError>;
