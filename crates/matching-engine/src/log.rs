//! Event log for the matching engine
//!
//! The worker appends the events of each task to an [`EventSink`] and
//! flushes once per task. A sink failure after the book was mutated means
//! memory and durable state have diverged; the worker halts the engine.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::SinkError;
use crate::event::MatchingEvent;

/// Destination for matching events (the persistence boundary)
pub trait EventSink: Send {
    /// Append one event
    fn append(&mut self, event: &MatchingEvent) -> Result<(), SinkError>;

    /// Make appended events durable
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn append(&mut self, _event: &MatchingEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

// ============================================================================
// In-memory log
// ============================================================================

#[derive(Debug, Default)]
struct LogInner {
    events: Vec<MatchingEvent>,
    sequence: u64,
}

/// In-memory event log
///
/// Cloning shares the underlying log, so a test or a publisher can read what
/// the worker appended.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLog {
    inner: Arc<Mutex<LogInner>>,
}

impl InMemoryEventLog {
    /// Create a new event log
    pub fn new() -> Self {
        Self::default()
    }

    /// Get events from a sequence number onwards
    pub fn events_from(&self, from_sequence: u64) -> Vec<MatchingEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|e| e.sequence() >= from_sequence)
            .cloned()
            .collect()
    }

    /// All events in append order
    pub fn events(&self) -> Vec<MatchingEvent> {
        self.inner.lock().events.clone()
    }

    /// Sequence of the last appended event
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// Get total number of events
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}

impl EventSink for InMemoryEventLog {
    fn append(&mut self, event: &MatchingEvent) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        inner.sequence = event.sequence();
        inner.events.push(event.clone());
        debug!(sequence = inner.sequence, kind = event.kind(), "Event appended to log");
        Ok(())
    }
}

// ============================================================================
// JSON-lines journal
// ============================================================================

/// Append-only journal writing one JSON object per line
pub struct JsonLinesJournal {
    writer: BufWriter<File>,
}

impl JsonLinesJournal {
    /// Open (or create) a journal file for appending
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        debug!(path = ?path.as_ref(), "Journal opened");
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonLinesJournal {
    fn append(&mut self, event: &MatchingEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
