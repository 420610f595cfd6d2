//! Process-unique ID generation for temp file names
//!
//! Every stash instance owns its own generator, so two stashes in the same
//! process never contend on a shared counter and unit tests get fresh
//! sequences for free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic ID source combining wall-clock nanoseconds with a sequence
/// number.
///
/// The sequence number alone guarantees uniqueness within an instance; the
/// timestamp prefix keeps IDs from different runs distinct so a temp file
/// surviving a crash can never collide with one from the next run.
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    /// Produce the next ID in the form `<unix-nanos>-<sequence>`.
    pub fn next_id(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", nanos, seq)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
