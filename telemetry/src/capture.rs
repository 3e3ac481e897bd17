//! Ring-buffer log capture.
//!
//! A fixed-capacity byte buffer that receives tracing output and keeps only
//! the most recent bytes once full.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriter;

/// Default maximum buffer size: 1 MiB
const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

/// Thread-safe in-memory log sink.
#[derive(Clone)]
pub struct LogCapture {
    ring: Arc<Mutex<RingBuffer>>,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCapture")
            .field("len", &self.len())
            .finish()
    }
}

impl LogCapture {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BYTES)
    }

    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(RingBuffer::new(max_bytes))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writer factory for use with tracing-subscriber.
    pub fn make_writer(&self) -> LogCaptureMakeWriter {
        LogCaptureMakeWriter {
            ring: Arc::clone(&self.ring),
        }
    }

    /// JSON subscriber writing into this capture, filtered by `directive`
    /// (e.g. `"debug"` or `"bulwark_resilience=trace"`).
    ///
    /// Install it with `tracing::subscriber::set_default` or `with_default`.
    pub fn subscriber(&self, directive: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_env_filter(EnvFilter::new(directive))
            .with_writer(self.make_writer())
            .finish()
    }

    /// Captured output as UTF-8 (lossy).
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().snapshot_bytes()).into_owned()
    }

    /// Every captured line that parses as a JSON object, oldest first.
    pub fn events(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(Value::is_object)
            .collect()
    }

    /// Events whose `message` field equals `message`.
    pub fn events_with_message(&self, message: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|event| event.get("message").and_then(Value::as_str) == Some(message))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Writer factory for tracing-subscriber integration.
#[derive(Clone)]
pub struct LogCaptureMakeWriter {
    ring: Arc<Mutex<RingBuffer>>,
}

impl<'a> MakeWriter<'a> for LogCaptureMakeWriter {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            ring: Arc::clone(&self.ring),
        }
    }
}

/// Writer that appends to the ring buffer.
pub struct LogCaptureWriter {
    ring: Arc<Mutex<RingBuffer>>,
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fixed-capacity ring buffer that evicts oldest bytes when full.
struct RingBuffer {
    max: usize,
    buf: VecDeque<u8>,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            max: capacity,
            buf: VecDeque::new(),
        }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn clear(&mut self) {
        self.buf.clear();
    }

    fn push_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        // Oversized chunk: keep only its tail.
        if data.len() >= self.max {
            self.buf.clear();
            let start = data.len() - self.max;
            self.buf.extend(data[start..].iter().copied());
            return;
        }

        let needed = self.len() + data.len();
        if needed > self.max {
            self.buf.drain(..needed - self.max);
        }
        self.buf.extend(data.iter().copied());
    }

    fn snapshot_bytes(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ring_buffer_evicts_oldest_bytes() {
        let capture = LogCapture::with_capacity(8);
        let mut writer = capture.make_writer().make_writer();
        writer.write_all(b"abcdef").unwrap();
        writer.write_all(b"ghij").unwrap();
        assert_eq!(capture.contents(), "cdefghij");

        writer.write_all(b"0123456789").unwrap();
        assert_eq!(capture.contents(), "23456789");
        assert_eq!(capture.len(), 8);

        capture.clear();
        assert!(capture.is_empty());
    }

    #[test]
    fn subscriber_records_structured_fields() {
        let capture = LogCapture::new();
        tracing::subscriber::with_default(capture.subscriber("info"), || {
            tracing::warn!(operation = "fetch", attempt = 2_u32, "attempt failed, retrying");
            tracing::debug!("filtered out");
        });

        let events = capture.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["level"], "WARN");
        assert_eq!(event["message"], "attempt failed, retrying");
        assert_eq!(event["operation"], "fetch");
        assert_eq!(event["attempt"], 2);
        assert_eq!(capture.events_with_message("attempt failed, retrying").len(), 1);
    }
}
