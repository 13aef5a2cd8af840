//! Bounded replay recording of terminal output and resize events.
//!
//! Each session owns one [`ReplayRecorder`]. It observes the raw output
//! stream and resize calls, and can reconstruct the session for a newly
//! attached observer as an ordered list of [`ReplayEntry`] values. Total
//! buffered output is capped; old data is dropped, never the newest.

use std::collections::VecDeque;

use terminal_relay_core::{Dimensions, ReplayEntry};

/// Default byte budget for buffered replay data.
pub const MAX_RECORDER_DATA_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
struct RecorderEntry {
    cols: u16,
    rows: u16,
    data: VecDeque<String>,
}

/// Bounded-size log of terminal output and resize events for one session.
#[derive(Debug)]
pub struct ReplayRecorder {
    entries: VecDeque<RecorderEntry>,
    total_bytes: usize,
    max_bytes: usize,
}

impl ReplayRecorder {
    /// Create a recorder with the default byte budget.
    pub fn new(dimensions: Dimensions) -> Self {
        Self::with_max_bytes(dimensions, MAX_RECORDER_DATA_BYTES)
    }

    /// Create a recorder with a custom byte budget.
    pub fn with_max_bytes(dimensions: Dimensions, max_bytes: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(RecorderEntry {
            cols: dimensions.cols,
            rows: dimensions.rows,
            data: VecDeque::new(),
        });
        Self {
            entries,
            total_bytes: 0,
            max_bytes,
        }
    }

    /// Append an output chunk to the newest entry, evicting the oldest
    /// buffered data once the byte budget is exceeded.
    pub fn record_data(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        // The constructor guarantees at least one entry.
        if let Some(entry) = self.entries.back_mut() {
            entry.data.push_back(data.to_string());
            self.total_bytes += data.len();
        }
        self.evict();
    }

    /// Record a resize.
    ///
    /// A resize before the newest entry produced any output retargets that
    /// entry in place; a resize to the current dimensions is a no-op;
    /// anything else starts a new entry.
    pub fn record_resize(&mut self, cols: u16, rows: u16) {
        if let Some(last) = self.entries.back_mut() {
            if last.data.is_empty() {
                last.cols = cols;
                last.rows = rows;
                return;
            }
            if last.cols == cols && last.rows == rows {
                return;
            }
        }
        self.entries.push_back(RecorderEntry {
            cols,
            rows,
            data: VecDeque::new(),
        });
    }

    /// Reconstruct the session history: one [`ReplayEntry`] per recorded
    /// span, fragments concatenated in production order.
    pub fn generate_replay(&self) -> Vec<ReplayEntry> {
        self.entries
            .iter()
            .map(|entry| ReplayEntry {
                cols: entry.cols,
                rows: entry.rows,
                data: entry.data.iter().map(String::as_str).collect(),
            })
            .collect()
    }

    /// Total bytes currently buffered across all entries.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Drop data from the oldest entries until the budget holds: trim the
    /// front of the oldest fragment when that suffices, otherwise drop the
    /// fragment whole, and drop entries that run out of fragments.
    fn evict(&mut self) {
        while self.total_bytes > self.max_bytes {
            let overflow = self.total_bytes - self.max_bytes;
            let Some(entry) = self.entries.front_mut() else {
                break;
            };
            let Some(piece) = entry.data.front_mut() else {
                if self.entries.len() > 1 {
                    self.entries.pop_front();
                    continue;
                }
                break;
            };
            if piece.len() <= overflow {
                self.total_bytes -= piece.len();
                entry.data.pop_front();
                if entry.data.is_empty() && self.entries.len() > 1 {
                    self.entries.pop_front();
                }
            } else {
                let cut = ceil_char_boundary(piece, overflow);
                piece.drain(..cut);
                self.total_bytes -= cut;
            }
        }
    }
}

/// Smallest char boundary in `s` at or above `index`.
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
