//! Header, chain record and codec definitions for POTATO70 bundle archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
//! A bundle packs many logical files into one physical archive:
//!
//! ```text
//! +----------------------+  0
//! | header (32 bytes)    |
//! +----------------------+  32
//! | chain 0 (320 bytes)  |
//! | chain 1 (320 bytes)  |
//! | ...                  |
//! +----------------------+  32 + index_size
//! | packed payloads      |
//! +----------------------+  file_size
//! ```
//!
//! This crate provides symmetric (parser and builder) implementations for the
//! header and the chain records, and the codec registry used to pack and
//! unpack payloads. It performs no file I/O; see `potato-bundle` for the
//! archive engine built on top of it.
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Verbatim Reserved Fields**: Unknown fields survive a round trip
//! - **Round-Trip Guarantee**: parse(build(data)) == data

#![warn(missing_docs)]

pub mod compression;
mod error;
mod header;
mod record;
mod time;

pub use compression::{Codec, CompressionRegistry};
pub use error::{FormatError, Result};
pub use header::BundleHeader;
pub use record::{FileRecord, decode_path, encode_path};
pub use time::FileTime;

/// Bundle layout constants
pub mod constants {
    /// Signature at the start of every bundle
    pub const BUNDLE_MAGIC: [u8; 8] = *b"POTATO70";

    /// Size of the header in bytes
    pub const HEADER_SIZE: u32 = 32;

    /// Size of one chain (index record) in bytes
    pub const CHAIN_LENGTH: u32 = 320;

    /// Size of the NUL-padded path field in bytes
    pub const PATH_LENGTH: usize = 256;

    /// Offset of the `data_offset` field within a chain
    pub const DATA_OFFSET_FIELD: u32 = 284;
}
