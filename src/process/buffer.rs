// src/process/buffer.rs

/// Appended once when a [`CappedBuffer`] hits its limit.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

/// Result of [`CappedBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// The whole chunk fit.
    Accepted,
    /// This chunk crossed the limit: its head was kept and the marker was
    /// appended. Happens at most once per buffer.
    Truncated,
    /// The buffer was already truncated; nothing was stored.
    Rejected,
}

/// Output accumulator with a byte ceiling.
///
/// The limit applies to captured output; the marker is stored on top of it.
#[derive(Debug, Clone)]
pub struct CappedBuffer {
    data: String,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &str) -> Append {
        if self.truncated {
            return Append::Rejected;
        }

        let remaining = self.limit.saturating_sub(self.data.len());
        if chunk.len() <= remaining {
            self.data.push_str(chunk);
            return Append::Accepted;
        }

        let mut cut = remaining;
        while !chunk.is_char_boundary(cut) {
            cut -= 1;
        }
        self.data.push_str(&chunk[..cut]);
        self.data.push_str(TRUNCATION_MARKER);
        self.truncated = true;
        Append::Truncated
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }
}

/// Decode a raw pipe chunk, carrying an incomplete trailing UTF-8 sequence
/// over to the next call in `pending`.
///
/// Invalid sequences are replaced with U+FFFD.
pub fn decode_chunk(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);

    let keep_from = match std::str::from_utf8(&pending[..]) {
        Ok(_) => pending.len(),
        // A sequence cut off at the very end; wait for the rest of it.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };

    let rest = pending.split_off(keep_from);
    let text = String::from_utf8_lossy(&pending[..]).into_owned();
    *pending = rest;
    text
}
