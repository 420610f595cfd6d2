//! Startup sweep for abandoned temp files
//!
//! A crash between temp file creation and rename leaves a `*.tmp` file
//! behind. These are garbage: the rename never happened, so no reader will
//! ever look at them. Each stash sweeps its base directory once at startup,
//! on a detached background thread so opening never waits on directory I/O.
//!
//! The sweep only touches files it can prove are both ours (record prefix
//! plus temp suffix) and stale (older than the configured age). Recent temp
//! files are skipped because they may belong to a save currently in flight
//! in another instance sharing this directory.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::filename;

/// Fire off the one-shot sweep thread for `dir`.
///
/// Every failure mode is absorbed: a sweep that cannot run, panics, or
/// deletes nothing affects neither the caller nor any stash operation.
pub(crate) fn spawn_sweep(dir: PathBuf, stale_age: Duration) {
    let spawned = thread::Builder::new()
        .name("stashkv-sweep".to_string())
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                sweep_stale_temps(&dir, stale_age);
            }));
            if outcome.is_err() {
                tracing::warn!(dir = %dir.display(), "temp file sweep panicked, skipping cleanup");
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "failed to spawn temp file sweep thread");
    }
}

/// Delete stale temp files directly under `dir`. Returns how many were
/// removed.
///
/// Errors never propagate: an unreadable directory or a file that vanishes
/// mid-sweep (for example, removed by a concurrent sweep) is logged and
/// skipped.
pub(crate) fn sweep_stale_temps(dir: &Path, stale_age: Duration) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "temp file sweep could not read directory");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0usize;

    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if !filename::is_temp_filename(name) {
                continue;
            }
        } else {
            continue;
        }

        // Only plain files; a directory with a temp-looking name is not ours.
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            _ => continue,
        }

        let modified = match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };

        // A future mtime (clock skew) counts as age zero, i.e. fresh.
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < stale_age {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "failed to remove stale temp file");
            }
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "removed stale temp files");
    }
    removed
}
