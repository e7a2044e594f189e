//! Error types for bundle operations

use std::io;

use potato_formats::FormatError;
use thiserror::Error;

/// Errors raised while opening or editing a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bad signature, truncated header or an index that does not fit the file
    #[error("invalid bundle archive: {0}")]
    InvalidArchive(String),

    /// No entry with this path
    #[error("entry not found: {0}")]
    NotFound(String),

    /// An entry with this path already exists
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// No registered codec claims the compression code
    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(u32),

    /// Entry path does not fit the path field
    #[error("path too long: {length} bytes (maximum {max})")]
    PathTooLong {
        /// Length of the offending path
        length: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Entry path cannot be stored or is not a valid name
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// The archive would outgrow its 32-bit size fields
    #[error("bundle size limit exceeded: {size} > {max}")]
    CapacityExceeded {
        /// Size the archive would reach
        size: u64,
        /// Largest representable size
        max: u64,
    },

    /// I/O error from the backing store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A mutation failed after its first physical write
    #[error("bundle is inconsistent after a failed mutation; reopen and verify")]
    Inconsistent,

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Format error not covered by another variant
    #[error("format error: {0}")]
    Format(FormatError),
}

impl From<FormatError> for BundleError {
    fn from(error: FormatError) -> Self {
        match error {
            FormatError::InvalidArchive { reason } => Self::InvalidArchive(reason),
            FormatError::PathTooLong { length, max } => Self::PathTooLong { length, max },
            FormatError::InvalidPath(path) => Self::InvalidPath(path),
            FormatError::UnsupportedCompression(code) => Self::UnsupportedCompression(code),
            FormatError::Io(e) => Self::Io(e),
            other => Self::Format(other),
        }
    }
}

impl BundleError {
    /// Check if this is a lookup failure that left the archive untouched
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyExists(_))
    }

    /// Check if the archive may be corrupt after this error
    pub fn is_corrupting(&self) -> bool {
        matches!(self, Self::Inconsistent)
    }
}

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors_map_onto_taxonomy() {
        assert!(matches!(
            BundleError::from(FormatError::UnsupportedCompression(9)),
            BundleError::UnsupportedCompression(9)
        ));
        assert!(matches!(
            BundleError::from(FormatError::PathTooLong {
                length: 300,
                max: 255
            }),
            BundleError::PathTooLong { length: 300, .. }
        ));
        assert!(matches!(
            BundleError::from(FormatError::Compression("bad".to_string())),
            BundleError::Format(FormatError::Compression(_))
        ));
    }

    #[test]
    fn test_classification() {
        assert!(BundleError::NotFound("x".to_string()).is_logical());
        assert!(BundleError::AlreadyExists("x".to_string()).is_logical());
        assert!(!BundleError::Inconsistent.is_logical());
        assert!(BundleError::Inconsistent.is_corrupting());
        assert!(!BundleError::UnsupportedCompression(7).is_corrupting());
    }
}
