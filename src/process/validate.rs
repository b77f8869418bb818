// src/process/validate.rs

use tracing::warn;

use crate::errors::{ProctorError, Result};
use crate::task::ProcessSpec;

/// Setting this to `1`/`true`/`yes` in a task's env overrides disables the
/// blocklist for that task.
pub const ALLOW_DANGEROUS_ENV: &str = "PROCTOR_ALLOW_DANGEROUS";

/// Substrings that make a command line refuse to run.
pub const DANGEROUS_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf ~",
    "rm -rf *",
    "mkfs",
    "dd if=/dev/zero",
    "dd if=/dev/random",
    "dd if=/dev/urandom",
    ":(){ :|:& };:",
    "shutdown",
    "reboot",
    "poweroff",
    "halt -f",
    "init 0",
    "chmod -R 777 /",
    "chown -R",
    "> /dev/sda",
    "format c:",
];

/// Structural and blocklist checks shared by both executors.
///
/// Never touches the OS; a failure here means no process was spawned.
pub fn validate_process(spec: &ProcessSpec) -> Result<()> {
    if spec.command.trim().is_empty() {
        return Err(ProctorError::ValidationError(
            "command must not be empty".to_string(),
        ));
    }

    if spec.command.contains('\0') || spec.args.iter().any(|a| a.contains('\0')) {
        return Err(ProctorError::ValidationError(
            "command and arguments must not contain NUL bytes".to_string(),
        ));
    }

    let line = spec.command_line();
    let lowered = line.to_lowercase();
    if let Some(hit) = DANGEROUS_COMMANDS
        .iter()
        .find(|pattern| lowered.contains(&pattern.to_lowercase()))
    {
        if spec.env_flag(ALLOW_DANGEROUS_ENV) {
            warn!(
                command = %line,
                pattern = %hit,
                "blocklisted command allowed by {ALLOW_DANGEROUS_ENV}"
            );
        } else {
            return Err(ProctorError::ValidationError(format!(
                "command '{line}' matches blocked pattern '{hit}' (set {ALLOW_DANGEROUS_ENV}=1 to override)"
            )));
        }
    }

    Ok(())
}
