// src/process/log_ring.rs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::OutputStream;

/// One captured line of service output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
    pub line: String,
}

impl LogLine {
    pub fn new(stream: OutputStream, line: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            line: line.into(),
        }
    }
}

/// Fixed-capacity log; the oldest line is dropped once full.
#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<LogLine>,
    capacity: usize,
    dropped: u64,
}

impl LogRing {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(line);
    }

    /// Last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<LogLine> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of lines evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
