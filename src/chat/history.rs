//! Append-only record of delivered messages.
//!
//! Entries are appended at the moment the router finalizes a delivery, so
//! rejected or malformed input never becomes history. Read access is
//! non-destructive; shutdown takes a `snapshot()` for the final transcript.

use super::frame::Frame;

#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<Frame>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, frame: Frame) {
        self.entries.push(frame);
    }

    /// The full ordered message sequence, for export.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.entries.clone()
    }

    /// Backs the "contains N messages" confirmation prompt.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
