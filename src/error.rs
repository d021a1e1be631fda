//! Error types for definition resolution, model building and checksums.
//!
//! Recoverable outcomes (a candidate that is missing on disk, a definition
//! that does not describe the image) are not errors: the resolver handles
//! them internally. Everything here is fatal to the operation that raised it
//! and carries enough context to build a human-readable message.

use crate::codec::CodecError;
use crate::io::error::IoError;
use thiserror::Error;

/// Main error type for romdef operations.
#[derive(Debug, Error)]
pub enum RomError {
    /// The definition could not be parsed, or is structurally unusable.
    #[error("Definition {candidate} is malformed: {message}")]
    MalformedDefinition { candidate: String, message: String },

    /// A `base` chain revisits a definition it already passed through.
    #[error("Looped inheritance in {candidate}: {}", chain.join(" -> "))]
    CyclicInheritance { candidate: String, chain: Vec<String> },

    /// No conversion layer could turn the candidate into a definition tree.
    #[error("Unsupported definition format for {candidate}: {reason}")]
    UnsupportedFormat { candidate: String, reason: String },

    /// An address fell outside the image, or a width was invalid.
    #[error("Address error: {0}")]
    OutOfRange(#[from] CodecError),

    /// Resource limit exceeded
    #[error("Resource limit exceeded: {resource} ({used}/{limit})")]
    ResourceExhausted {
        resource: String,
        used: u64,
        limit: u64,
    },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The image handed back does not belong to the rom it is used with.
    #[error("Image does not match rom {xmlid}: {reason}")]
    ImageMismatch { xmlid: String, reason: String },

    /// Background load did not finish in time
    #[error("Load timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// The background worker panicked or was torn down.
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl RomError {
    pub(crate) fn malformed(candidate: impl Into<String>, message: impl Into<String>) -> Self {
        RomError::MalformedDefinition {
            candidate: candidate.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(candidate: impl Into<String>, reason: impl Into<String>) -> Self {
        RomError::UnsupportedFormat {
            candidate: candidate.into(),
            reason: reason.into(),
        }
    }

    /// True for allocation/limit failures that callers report separately
    /// from ordinary load failures.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, RomError::ResourceExhausted { .. })
    }
}

impl From<IoError> for RomError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::FileTooLarge { limit, found } => RomError::ResourceExhausted {
                resource: "file size".to_string(),
                used: found,
                limit,
            },
            IoError::StdIo(e) => RomError::Io(e),
        }
    }
}

/// Result type alias for romdef operations
pub type Result<T> = std::result::Result<T, RomError>;
