//! Open, read and edit POTATO70 bundle archives in place
//!
#![allow(clippy::cast_possible_truncation)] // Offsets are bounded by 32-bit size fields
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Errors are documented on BundleError
//! This crate implements the archive engine on top of `potato-formats`:
//!
//! - [`Bundle`]: the archive context object holding header, index, codec
//!   registry and backing store behind a read/write lock
//! - [`RangeStore`]: byte-range primitives (read, write, insert, cut) with
//!   file and in-memory implementations
//! - In-place mutations (create, overwrite, rename, move, delete) that keep
//!   header, index and payload offsets consistent
//! - A folder listing derived from entry paths
//! - Layout validation reporting every broken invariant
//!
//! # Example
//!
//! ```no_run
//! use potato_bundle::Bundle;
//!
//! let bundle = Bundle::create_empty("new.bundle")?;
//! bundle.create(b"hello", "\\test.txt", 0, false)?;
//! bundle.rename("\\test.txt", "greeting.txt")?;
//! assert_eq!(bundle.list_files(), vec!["\\greeting.txt"]);
//! # Ok::<(), potato_bundle::BundleError>(())
//! ```
//!
//! # Failure model
//!
//! Inputs are validated before anything is written, so lookup, path and
//! codec errors leave the archive untouched. A store failure after the
//! first write of a multi-step mutation leaves the bundle
//! [`BundleStatus::Inconsistent`]; it then refuses further store access and
//! must be reopened and checked with [`Bundle::verify`].

#![warn(missing_docs)]

mod bundle;
pub mod config;
pub mod directory;
mod engine;
mod error;
pub mod path;
pub mod store;
pub mod validation;

pub use bundle::Bundle;
pub use config::BundleConfig;
pub use directory::DirectoryIndex;
pub use engine::BundleStatus;
pub use error::{BundleError, Result};
pub use store::{FileStore, MemoryStore, RangeStore};
pub use validation::{ValidationReport, Violation};

// Re-export the format types callers need alongside the engine
pub use potato_formats::{BundleHeader, Codec, CompressionRegistry, FileRecord, FileTime};
