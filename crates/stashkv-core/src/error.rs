//! Error types for stash operations
//!
//! All stash errors are represented by the StashError enum, which carries
//! enough context (paths, error kinds, the offending key) for callers to
//! log something useful or branch on the failure.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Stash error types with detailed context
#[derive(Debug, Clone)]
pub enum StashError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// No record exists for the requested key
    NotFound {
        /// First key part as passed by the caller
        part1: String,
        /// Second key part as passed by the caller
        part2: String,
    },

    /// Payload could not be encoded or decoded
    Codec {
        /// Record file involved, when the payload came from disk
        path: Option<PathBuf>,
        /// Description of the codec failure
        message: String,
    },

    /// A derived record path resolved outside the base directory
    PathEscape {
        /// The filename that failed the containment check
        filename: String,
    },

    /// Configuration rejected at construction time
    Config {
        /// Description of the invalid setting
        message: String,
    },
}

impl StashError {
    /// True when the error means "no record saved under this key yet".
    ///
    /// Callers that treat a missing record as a normal first-run condition
    /// branch on this instead of matching the enum.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StashError::NotFound { .. })
    }
}

impl fmt::Display for StashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StashError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            StashError::NotFound { part1, part2 } => {
                write!(f, "no record found for key ({:?}, {:?})", part1, part2)
            }

            StashError::Codec { path, message } => {
                if let Some(path) = path {
                    write!(f, "codec error in {}: {}", path.display(), message)
                } else {
                    write!(f, "codec error: {}", message)
                }
            }

            StashError::PathEscape { filename } => {
                write!(f, "derived filename {:?} resolves outside the base directory", filename)
            }

            StashError::Config { message } => {
                write!(f, "invalid configuration: {}", message)
            }
        }
    }
}

impl Error for StashError {}

/// Convert std::io::Error to StashError::Io
impl From<std::io::Error> for StashError {
    fn from(err: std::io::Error) -> Self {
        StashError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for stash operations
pub type StashResult<T> = Result<T, StashError>;
