//! Fine-grained keyed locking for record files
//!
//! One mutex per active key, allocated on demand:
//! - A table mutex guards only the key-to-entry map and is never held while
//!   a caller blocks or runs a critical section
//! - Each entry carries a raw mutex so acquire and release can happen in
//!   separate calls, which the save/load protocol needs
//! - Entries are reference counted; the last releaser removes the table
//!   slot and parks the entry in a bounded free list for reuse
//!
//! Locks are not reentrant. A thread that locks the same key twice without
//! releasing deadlocks on itself, same as a plain mutex.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};

/// Drained entries kept around for reuse before allocation starts again
const POOL_LIMIT: usize = 64;

/// A single keyed mutex. Lives behind an Arc so its address stays stable
/// while waiters block on it outside the table mutex.
struct Entry {
    raw: RawMutex,
}

impl Entry {
    fn unlocked() -> Arc<Entry> {
        Arc::new(Entry {
            raw: RawMutex::INIT,
        })
    }
}

/// Table slot for one active key.
///
/// `refs` counts holders plus waiters and is only touched under the table
/// mutex, so a plain integer is enough.
struct Slot {
    entry: Arc<Entry>,
    refs: usize,
}

#[derive(Default)]
struct Table {
    held: HashMap<String, Slot>,
    pool: Vec<Arc<Entry>>,
}

impl Table {
    /// Register interest in `key`: bump the existing slot or install a new
    /// one from the pool. Returns the entry to block on.
    fn checkout(&mut self, key: &str) -> Arc<Entry> {
        if let Some(slot) = self.held.get_mut(key) {
            slot.refs += 1;
            return Arc::clone(&slot.entry);
        }
        let entry = self.pool.pop().unwrap_or_else(Entry::unlocked);
        self.held.insert(
            key.to_string(),
            Slot {
                entry: Arc::clone(&entry),
                refs: 1,
            },
        );
        entry
    }

    /// Park a drained, unlocked entry for reuse. Beyond the cap the entry
    /// is simply dropped.
    fn retire(&mut self, entry: Arc<Entry>) {
        if self.pool.len() < POOL_LIMIT {
            self.pool.push(entry);
        }
    }
}

/// Dynamic table of per-key mutexes.
///
/// Memory use is proportional to the number of keys currently locked or
/// awaited, not the number of keys ever seen.
pub struct KeyLocks {
    table: Mutex<Table>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
        }
    }

    /// Block until `key` is exclusively held by the caller.
    pub fn lock(&self, key: &str) {
        let entry = self.table.lock().checkout(key);
        // Block only after the table mutex is gone, so contention on this
        // key never delays callers working on other keys.
        entry.raw.lock();
    }

    /// Acquire `key` only if that is possible without blocking. Returns
    /// whether the caller now holds the key.
    pub fn try_lock(&self, key: &str) -> bool {
        let mut table = self.table.lock();
        if let Some(slot) = table.held.get_mut(key) {
            // The table mutex pins the slot, so a failed attempt leaves no
            // trace and a successful one can bump refs in place.
            if slot.entry.raw.try_lock() {
                slot.refs += 1;
                true
            } else {
                false
            }
        } else {
            let entry = table.pool.pop().unwrap_or_else(Entry::unlocked);
            // CRITICAL ORDERING: acquire before the slot becomes visible.
            // Pooled and fresh entries are always unlocked, so this never
            // blocks; inserting first would let another caller win the
            // mutex between our table release and this acquire.
            entry.raw.lock();
            table.held.insert(key.to_string(), Slot { entry, refs: 1 });
            true
        }
    }

    /// Release `key`.
    ///
    /// # Panics
    /// Panics when the caller does not hold `key` through a prior `lock` or
    /// successful `try_lock`. An unpaired release is a caller bug that
    /// would otherwise corrupt whoever legitimately holds the key next.
    pub fn unlock(&self, key: &str) {
        let mut table = self.table.lock();
        let remaining = {
            let slot = match table.held.get_mut(key) {
                Some(slot) => slot,
                None => panic!("unlock of key {:?} that was never locked", key),
            };
            // SAFETY: the unlock contract requires the caller to hold this
            // key, so the raw mutex is locked and owned by the caller.
            unsafe { slot.entry.raw.unlock() };
            slot.refs -= 1;
            slot.refs
        };
        if remaining == 0 {
            if let Some(slot) = table.held.remove(key) {
                table.retire(slot.entry);
            }
        }
    }

    /// Run `f` while holding `key`, releasing on the way out even if `f`
    /// panics.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let _guard = self.guard(key);
        f()
    }

    /// Acquire `key` and return a guard that releases it on drop.
    pub fn guard(&self, key: &str) -> KeyGuard<'_> {
        self.lock(key);
        KeyGuard {
            locks: self,
            key: key.to_string(),
        }
    }

    /// Number of keys currently locked or awaited
    pub fn active_count(&self) -> usize {
        self.table.lock().held.len()
    }

    /// Number of drained entries parked for reuse
    pub fn pooled_count(&self) -> usize {
        self.table.lock().pool.len()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a key until dropped
#[must_use]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.unlock(&self.key);
    }
}
