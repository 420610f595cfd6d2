//! StashKV Core — Durable Per-Key State Storage
//!
//! An embedded store that maps two-part string keys to individual JSON
//! record files on disk, built for workloads that checkpoint small state
//! blobs and must survive crashes at any instant.
//!
//! # Architecture
//!
//! - **One file per key**: human-readable filenames with a hash suffix,
//!   all inside a single base directory
//! - **Atomic replacement**: saves stage to a temp file, sync, then rename
//!   over the final name, so readers never see partial records
//! - **Per-key locking**: a dynamic lock table serializes same-key access
//!   while distinct keys proceed in parallel
//!
//! # No Format Assumptions
//!
//! Payloads pass through a pluggable codec; the default is pretty-printed
//! JSON so record files can be read and edited by hand. The core never
//! interprets payload bytes.

pub mod codec;
pub mod config;
pub mod durability;
pub mod error;
pub mod filename;
pub mod idgen;
pub mod keylock;
pub mod store;

mod cleanup;

// Re-export key types for convenience
pub use codec::{Codec, JsonCodec};
pub use config::Config;
pub use error::{StashError, StashResult};
pub use idgen::IdGenerator;
pub use keylock::{KeyGuard, KeyLocks};
pub use store::{Stash, DEFAULT_DIR};
