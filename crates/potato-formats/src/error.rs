//! Error types for bundle format parsing and building

use thiserror::Error;

/// Errors raised while decoding or encoding bundle structures
#[derive(Debug, Error)]
pub enum FormatError {
    /// Bad signature or truncated header
    #[error("invalid bundle archive: {reason}")]
    InvalidArchive {
        /// What made the archive unreadable
        reason: String,
    },

    /// Entry path does not fit the 256-byte path field
    #[error("path too long: {length} bytes (maximum {max})")]
    PathTooLong {
        /// Encoded length of the offending path
        length: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Entry path cannot be stored in the single-byte path field
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// No registered codec claims the compression code
    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(u32),

    /// Compression/decompression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Binary parsing error
    #[error("binary format error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub(crate) fn invalid_archive(reason: impl Into<String>) -> Self {
        Self::InvalidArchive {
            reason: reason.into(),
        }
    }

    /// Check if the error was raised before any bytes were written
    ///
    /// Path and codec errors are detected while preparing a mutation, so
    /// the archive they concern is left untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::PathTooLong { .. } | Self::InvalidPath(_) | Self::UnsupportedCompression(_)
        )
    }
}

/// Result type for bundle format operations
pub type Result<T> = std::result::Result<T, FormatError>;
