// src/task/descriptor.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{TaskKind, TaskStatus};

/// Fields shared by every descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub id: String,
    pub kind: TaskKind,
    pub title: String,
    /// Free-form text for humans; executors only log it.
    pub instructions: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDescriptor {
    /// New pending descriptor with a random id.
    pub fn new(kind: TaskKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            instructions: String::new(),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// What to exec: program, arguments, working directory and environment.
///
/// The program is executed directly (no shell), so arguments are passed
/// through verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Program and arguments joined with spaces, for logs and blocklist
    /// matching.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    /// True if `key` is set in the override environment to a truthy value
    /// (`1`, `true`, `yes`, case-insensitive).
    pub fn env_flag(&self, key: &str) -> bool {
        self.env
            .get(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}
