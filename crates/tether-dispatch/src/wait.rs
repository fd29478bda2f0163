//! Wait-operation tracker.
//!
//! Some logical operations (wait-for-navigation and friends) span several
//! wire round trips: a `before` phase opens the operation, any number of
//! `log` phases append progress lines, and an `after` phase closes it. All
//! phases carry the same caller-supplied wait id, and from instrumentation's
//! point of view they form a single call.

use std::collections::HashMap;

use tether_wire::{monotonic_time_ms, CallMetadata, SerializedError};

/// Tracks open wait operations by caller-supplied id.
#[derive(Default)]
pub(crate) struct WaitOperations {
    entries: HashMap<String, CallMetadata>,
}

impl WaitOperations {
    /// Open a new operation. Returns a snapshot for the before-call hook.
    pub(crate) fn begin(&mut self, wait_id: &str, metadata: CallMetadata) -> CallMetadata {
        let snapshot = metadata.clone();
        self.entries.insert(wait_id.to_string(), metadata);
        snapshot
    }

    /// Append a log line to an open operation. Returns a snapshot for the
    /// log hook, or `None` if the id is unknown.
    pub(crate) fn log(&mut self, wait_id: &str, message: &str) -> Option<CallMetadata> {
        let entry = self.entries.get_mut(wait_id)?;
        entry.log.push(message.to_string());
        Some(entry.clone())
    }

    /// Close an operation: record end time and optional error, remove the
    /// entry, and return it for the after-call hook. `None` if the id is
    /// unknown (already closed or never opened).
    pub(crate) fn finish(&mut self, wait_id: &str, error: Option<&str>) -> Option<CallMetadata> {
        let mut entry = self.entries.remove(wait_id)?;
        entry.end_time = monotonic_time_ms();
        entry.error = error.map(SerializedError::new);
        Some(entry)
    }

    /// Number of open operations.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
