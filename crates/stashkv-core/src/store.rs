//! Durable key-value store — the heart of the stash.
//!
//! A Stash maps two-part string keys to JSON record files in a single base
//! directory. Saves replace whole records atomically, loads hand back typed
//! values, and a per-key lock table keeps concurrent writers to the same
//! key from interleaving.
//!
//! **Write path**: encode, stage to a temp file, sync, atomic rename
//! **Read path**: read the record file under the key lock, decode after
//! **Background**: one startup sweep removes temp files orphaned by crashes

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cleanup;
use crate::codec::{Codec, JsonCodec};
use crate::config::Config;
use crate::durability;
use crate::error::{StashError, StashResult};
use crate::filename;
use crate::idgen::IdGenerator;
use crate::keylock::KeyLocks;

/// Base directory used when the caller passes an empty path
pub const DEFAULT_DIR: &str = "stash-data";

/// Durable store of typed values keyed by two-part string keys.
///
/// All public methods take `&self` for concurrent access. Operations on
/// different keys proceed in parallel; operations on the same key serialize
/// through the lock table. Values go through the codec, pretty JSON unless
/// the stash was opened with something else.
pub struct Stash<C = JsonCodec> {
    /// Absolute base directory holding every record file
    base: PathBuf,
    /// Parameters fixed at open time
    config: Config,
    /// Per-key mutual exclusion for record file access
    locks: KeyLocks,
    /// Temp file name uniqueness, private to this instance
    ids: IdGenerator,
    /// Payload encoder/decoder
    codec: C,
}

impl<C> fmt::Debug for Stash<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stash")
            .field("base", &self.base)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Stash<JsonCodec> {
    /// Open or create a stash at `dir` with default configuration.
    ///
    /// An empty `dir` selects `stash-data` under the current working
    /// directory. The directory is created if missing and resolved to an
    /// absolute path, so record I/O is unaffected by later working
    /// directory changes.
    pub fn open<P: AsRef<Path>>(dir: P) -> StashResult<Self> {
        Self::open_with(dir, Config::default())
    }

    /// Open or create a stash with explicit configuration.
    pub fn open_with<P: AsRef<Path>>(dir: P, config: Config) -> StashResult<Self> {
        Self::open_with_codec(dir, config, JsonCodec)
    }
}

impl<C: Codec> Stash<C> {
    /// Open or create a stash with a custom payload codec.
    pub fn open_with_codec<P: AsRef<Path>>(dir: P, config: Config, codec: C) -> StashResult<Self> {
        config
            .validate()
            .map_err(|message| StashError::Config { message })?;

        let requested = dir.as_ref();
        let requested = if requested.as_os_str().is_empty() {
            Path::new(DEFAULT_DIR)
        } else {
            requested
        };

        fs::create_dir_all(requested).map_err(|e| StashError::Io {
            path: Some(requested.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to create base directory: {}", e),
        })?;

        // Pin the base to an absolute path up front so a later working
        // directory change cannot redirect record I/O.
        let base = fs::canonicalize(requested).map_err(|e| StashError::Io {
            path: Some(requested.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to resolve base directory: {}", e),
        })?;

        if config.startup_cleanup {
            cleanup::spawn_sweep(base.clone(), config.stale_temp_age);
        }

        tracing::debug!(base = %base.display(), "opened stash");

        Ok(Self {
            base,
            config,
            locks: KeyLocks::new(),
            ids: IdGenerator::new(),
            codec,
        })
    }

    /// Save `value` under the two-part key, replacing any previous record.
    ///
    /// WRITE ORDERING (the crash safety contract):
    /// 1. Encode the payload, no lock held
    /// 2. Take the per-key lock
    /// 3. Write the payload to a uniquely named temp file in the base directory
    /// 4. Sync the temp file, then close it
    /// 5. Rename over the final name (atomic on POSIX), with bounded retries
    /// 6. Sync the base directory, best effort
    ///
    /// A crash before the rename leaves any previous record untouched and
    /// at worst an orphaned temp file for the startup sweep. Readers never
    /// observe a partially written record.
    pub fn save<T: Serialize>(&self, part1: &str, part2: &str, value: &T) -> StashResult<()> {
        let payload = self.codec.encode(value)?;
        let name = filename::record_filename(part1, part2);
        let target = filename::resolve_under(&self.base, &name)?;

        self.locks.with_lock(&name, || {
            let temp = self
                .base
                .join(filename::temp_filename(&name, &self.ids.next_id()));
            let written = self.write_record(&temp, &target, &payload);
            if written.is_err() {
                // The staging file is useless once the attempt failed.
                let _ = fs::remove_file(&temp);
            }
            written
        })
    }

    /// Load the record for the two-part key into a value of type `T`.
    ///
    /// The file is read under the per-key lock so a concurrent save cannot
    /// interleave; decoding runs after the lock is released. A missing
    /// record reports `StashError::NotFound`, which callers can detect with
    /// `is_not_found()`.
    pub fn load<T: DeserializeOwned>(&self, part1: &str, part2: &str) -> StashResult<T> {
        let name = filename::record_filename(part1, part2);
        let target = filename::resolve_under(&self.base, &name)?;

        let bytes = self.locks.with_lock(&name, || match fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StashError::NotFound {
                part1: part1.to_string(),
                part2: part2.to_string(),
            }),
            Err(err) => Err(StashError::Io {
                path: Some(target.clone()),
                kind: err.kind(),
                message: format!("Failed to read record file: {}", err),
            }),
        })?;

        self.codec.decode(&bytes).map_err(|err| match err {
            StashError::Codec { message, .. } => StashError::Codec {
                path: Some(target),
                message,
            },
            other => other,
        })
    }

    /// Absolute path the record for this key lives at, whether or not it
    /// exists yet.
    pub fn record_path(&self, part1: &str, part2: &str) -> StashResult<PathBuf> {
        let name = filename::record_filename(part1, part2);
        filename::resolve_under(&self.base, &name)
    }

    /// Absolute base directory containing all record files.
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Configuration this stash was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one synchronous sweep of stale temp files, returning how many
    /// were removed. The same sweep runs in the background at open time
    /// unless `startup_cleanup` is off.
    pub fn sweep_stale_temps(&self) -> usize {
        cleanup::sweep_stale_temps(&self.base, self.config.stale_temp_age)
    }

    /// Stage, sync and swap one record. Caller holds the key lock.
    fn write_record(&self, temp: &Path, target: &Path, payload: &[u8]) -> StashResult<()> {
        // Step 1: create the staging file. create_new flags a collision
        // instead of silently sharing a file with another writer.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)
            .map_err(|e| StashError::Io {
                path: Some(temp.to_path_buf()),
                kind: e.kind(),
                message: format!("Failed to create temp file: {}", e),
            })?;

        // Step 2: write the complete payload
        file.write_all(payload).map_err(|e| StashError::Io {
            path: Some(temp.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to write temp file: {}", e),
        })?;

        // Step 3: contents must be durable before the swap
        durability::sync_file(&file).map_err(|e| StashError::Io {
            path: Some(temp.to_path_buf()),
            kind: e.kind(),
            message: format!("Failed to sync temp file: {}", e),
        })?;

        // Step 4: close before renaming; some platforms refuse to rename
        // a file that is still open
        drop(file);

        // Step 5: atomic swap into the final name
        self.rename_with_retry(temp, target)?;

        // Step 6: sync the directory so the rename itself survives power
        // loss. Best effort: the payload already reached the disk, only
        // the directory entry update is at stake.
        if let Err(err) = durability::sync_dir(&self.base) {
            tracing::debug!(
                dir = %self.base.display(),
                error = %err,
                "directory sync after rename failed"
            );
        }

        Ok(())
    }

    /// Rename with a bounded retry loop.
    ///
    /// On Windows a rename fails transiently while a scanner or indexer
    /// holds the record file open; a short pause and a second attempt
    /// almost always clears it. POSIX renames virtually never retry.
    fn rename_with_retry(&self, temp: &Path, target: &Path) -> StashResult<()> {
        let attempts = self.config.rename_retries;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match fs::rename(temp, target) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        path = %target.display(),
                        attempt,
                        error = %err,
                        "rename failed, retrying"
                    );
                    thread::sleep(self.config.rename_retry_delay);
                }
                Err(err) => {
                    return Err(StashError::Io {
                        path: Some(target.to_path_buf()),
                        kind: err.kind(),
                        message: format!(
                            "Failed to rename temp file into place after {} attempts: {}",
                            attempt, err
                        ),
                    });
                }
            }
        }
    }
}
