//! Buffer module for accumulating log records between flushes.
//!
//! Appends never block on I/O and never fail. A drain swaps the whole
//! sequence out under the lock, so every record lands in exactly one
//! snapshot and nothing appended afterwards is lost.

use parking_lot::Mutex;
use tracing::trace;

use crate::record::LogRecord;

/// Initial capacity reserved after each drain.
const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Statistics about buffer operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total number of records appended
    pub logs_received: u64,

    /// Total number of records handed out by drains
    pub logs_drained: u64,

    /// Number of non-empty drains
    pub drains: u64,
}

#[derive(Debug, Default)]
struct BufferState {
    records: Vec<LogRecord>,
    stats: BufferStats,
}

/// Unbounded, ordered buffer of records waiting to be flushed.
#[derive(Debug, Default)]
pub struct EventBuffer {
    state: Mutex<BufferState>,
}

impl EventBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(DEFAULT_BUFFER_CAPACITY),
                stats: BufferStats::default(),
            }),
        }
    }

    /// Append a record at the end of the buffer.
    pub fn append(&self, record: LogRecord) {
        let mut state = self.state.lock();
        state.stats.logs_received += 1;
        state.records.push(record);
    }

    /// Take the current contents and leave the buffer empty, in one step.
    pub fn drain_snapshot(&self) -> Vec<LogRecord> {
        let mut state = self.state.lock();
        if state.records.is_empty() {
            return Vec::new();
        }

        let records = std::mem::replace(
            &mut state.records,
            Vec::with_capacity(DEFAULT_BUFFER_CAPACITY),
        );
        state.stats.logs_drained += records.len() as u64;
        state.stats.drains += 1;
        trace!(drained = records.len(), "Buffer drained");
        records
    }

    /// Get the current number of records in the buffer.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Get current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        self.state.lock().stats.clone()
    }
}
