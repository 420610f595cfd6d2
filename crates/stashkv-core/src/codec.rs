//! Payload encoding for record files
//!
//! The stash core never interprets payload bytes itself; everything on-disk
//! goes through a Codec. The default is pretty-printed JSON so record files
//! stay inspectable with a plain text editor, which matters for the "debug a
//! crashed agent by reading its state file" workflow.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StashError, StashResult};

/// Converts values to and from record file bytes.
///
/// Implementations must be deterministic for a given value and must not
/// depend on file paths; path context is attached by the caller when a
/// decode fails on bytes read from disk.
pub trait Codec {
    fn encode<T: Serialize>(&self, value: &T) -> StashResult<Vec<u8>>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> StashResult<T>;
}

/// Default codec: indented JSON via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> StashResult<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|e| StashError::Codec {
            path: None,
            message: format!("Failed to serialize value: {}", e),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> StashResult<T> {
        serde_json::from_slice(bytes).map_err(|e| StashError::Codec {
            path: None,
            message: format!("Failed to deserialize value: {}", e),
        })
    }
}
