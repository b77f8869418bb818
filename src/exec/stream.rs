// src/exec/stream.rs

//! Output collection for finite commands.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::events::EventBus;
use crate::exec::events::CommandEvent;
use crate::process::buffer::{Append, CappedBuffer, decode_chunk};
use crate::types::{OutputStream, OverflowPolicy};

const READ_CHUNK: usize = 8 * 1024;

/// Callback invoked with every decoded output chunk.
pub type ChunkHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-chunk callbacks for [`super::CommandExecutor::execute_with_stream`].
///
/// With `accumulate = false` output is only delivered to the callbacks and
/// the result's `stdout`/`stderr` stay empty.
#[derive(Clone)]
pub struct StreamHandlers {
    pub on_stdout: Option<ChunkHandler>,
    pub on_stderr: Option<ChunkHandler>,
    pub accumulate: bool,
}

impl Default for StreamHandlers {
    fn default() -> Self {
        Self {
            on_stdout: None,
            on_stderr: None,
            accumulate: true,
        }
    }
}

impl fmt::Debug for StreamHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("accumulate", &self.accumulate)
            .finish()
    }
}

impl StreamHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stdout(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(f));
        self
    }

    pub fn on_stderr(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(f));
        self
    }

    pub fn accumulate(mut self, accumulate: bool) -> Self {
        self.accumulate = accumulate;
        self
    }

    pub(crate) fn handler_for(&self, stream: OutputStream) -> Option<ChunkHandler> {
        match stream {
            OutputStream::Stdout => self.on_stdout.clone(),
            OutputStream::Stderr => self.on_stderr.clone(),
        }
    }
}

/// Where one stream's chunks go during one attempt.
pub(crate) struct StreamSink {
    pub task_id: String,
    pub attempt: u32,
    pub stream: OutputStream,
    pub buffer: Option<Arc<Mutex<CappedBuffer>>>,
    pub handler: Option<ChunkHandler>,
    pub overflow: OverflowPolicy,
    pub events: EventBus<CommandEvent>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Pause,
}

impl StreamSink {
    fn deliver(&self, chunk: &str) -> Flow {
        self.events.emit(CommandEvent::Output {
            task_id: self.task_id.clone(),
            attempt: self.attempt,
            stream: self.stream,
            chunk: chunk.to_string(),
        });

        if let Some(handler) = &self.handler {
            handler(chunk);
        }

        let Some(buffer) = &self.buffer else {
            return Flow::Continue;
        };
        let (appended, limit) = {
            let mut buf = buffer.lock();
            (buf.push(chunk), buf.limit())
        };

        match appended {
            Append::Accepted => Flow::Continue,
            Append::Truncated => {
                warn!(
                    task = %self.task_id,
                    attempt = self.attempt,
                    stream = %self.stream,
                    limit,
                    "output exceeded buffer limit; truncating"
                );
                self.events.emit(CommandEvent::OutputTruncated {
                    task_id: self.task_id.clone(),
                    attempt: self.attempt,
                    stream: self.stream,
                    limit,
                });
                match self.overflow {
                    OverflowPolicy::Pause => Flow::Pause,
                    OverflowPolicy::Drain => Flow::Continue,
                }
            }
            Append::Rejected => Flow::Continue,
        }
    }
}

/// Read `reader` until EOF, feeding `sink`.
///
/// When the sink asks to pause, reading stops and the still-open reader is
/// handed back so the pipe stays open (the writer blocks instead of getting
/// EPIPE) until the caller drops it.
pub(crate) async fn pump<R>(mut reader: R, sink: StreamSink) -> Option<R>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut pending = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(task = %sink.task_id, stream = %sink.stream, error = %e, "output read failed");
                break;
            }
        };

        let text = decode_chunk(&mut pending, &buf[..n]);
        if text.is_empty() {
            continue;
        }
        if sink.deliver(&text) == Flow::Pause {
            debug!(task = %sink.task_id, stream = %sink.stream, "pausing output stream");
            return Some(reader);
        }
    }

    if !pending.is_empty() {
        let tail = String::from_utf8_lossy(&pending).into_owned();
        sink.deliver(&tail);
    }
    None
}
