//! Pluggable per-entry compression
//!
//! Every chain carries a numeric compression code. A [`CompressionRegistry`]
//! maps those codes onto [`Codec`] implementations. The registry is a plain
//! value owned by whoever opens an archive, so two archives can run with
//! different codec sets side by side.
//!
//! # Default codecs
//!
//! | code  | codec                    |
//! |-------|--------------------------|
//! | 0     | identity (stored)        |
//! | 1     | deflate, zlib-wrapped    |
//! | 2, 3  | zstd                     |
//! | 4, 5  | LZ4 block                |
//!
//! # Registration rules
//!
//! - Registering a codec whose code set equals the code set of an already
//!   registered codec replaces that codec.
//! - Otherwise the codec is added after the existing ones. Code sets may
//!   overlap; [`CompressionRegistry::lookup`] returns the first codec in
//!   registration order that claims the code.
//!
//! ```rust
//! use potato_formats::compression::{CompressionRegistry, CODE_DEFLATE};
//!
//! let registry = CompressionRegistry::with_defaults();
//! let codec = registry.lookup(CODE_DEFLATE)?;
//! let packed = codec.compress(b"hello hello hello hello")?;
//! assert_eq!(codec.decompress(&packed, 23)?, b"hello hello hello hello");
//! # Ok::<(), potato_formats::FormatError>(())
//! ```

mod codecs;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{FormatError, Result};

pub use codecs::{DeflateCodec, IdentityCodec, Lz4Codec, MAX_DECOMPRESSION_SIZE, ZstdCodec};

/// Stored without compression
pub const CODE_NONE: u32 = 0;
/// Zlib-wrapped deflate
pub const CODE_DEFLATE: u32 = 1;
/// Zstandard, first code of the family
pub const CODE_ZSTD: u32 = 2;
/// LZ4 block, first code of the family
pub const CODE_LZ4: u32 = 4;

/// A compressor/decompressor claiming one or more compression codes
pub trait Codec: Send + Sync + fmt::Debug {
    /// Human readable codec name
    fn name(&self) -> &str;

    /// Compression codes this codec handles
    fn codes(&self) -> &[u32];

    /// Compress a whole payload
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress a whole payload
    ///
    /// `uncompressed_size` is the size recorded in the chain. Codecs that
    /// need it to size their output rely on it; others may ignore it.
    fn decompress(&self, data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>>;
}

#[derive(Clone)]
struct Registration {
    codes: BTreeSet<u32>,
    codec: Arc<dyn Codec>,
}

/// Ordered table of codecs keyed by compression code
#[derive(Clone, Default)]
pub struct CompressionRegistry {
    entries: Vec<Registration>,
}

impl CompressionRegistry {
    /// Create a registry with no codecs
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the four default codecs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IdentityCodec));
        registry.register(Arc::new(DeflateCodec::default()));
        registry.register(Arc::new(ZstdCodec::default()));
        registry.register(Arc::new(Lz4Codec));
        registry
    }

    /// Register a codec
    ///
    /// Returns the codec it replaced, if one was registered under exactly the
    /// same set of codes.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        let codes: BTreeSet<u32> = codec.codes().iter().copied().collect();

        let replaced = self
            .entries
            .iter()
            .position(|entry| entry.codes == codes)
            .map(|index| self.entries.remove(index).codec);

        self.entries.push(Registration { codes, codec });
        replaced
    }

    /// Find the codec for a compression code
    ///
    /// Fails with [`FormatError::UnsupportedCompression`] when no registered
    /// codec claims `code`. Lookup never modifies the registry.
    pub fn lookup(&self, code: u32) -> Result<Arc<dyn Codec>> {
        self.entries
            .iter()
            .find(|entry| entry.codes.contains(&code))
            .map(|entry| Arc::clone(&entry.codec))
            .ok_or(FormatError::UnsupportedCompression(code))
    }

    /// Remove whichever codec currently answers for `code`
    pub fn unregister(&mut self, code: u32) -> Option<Arc<dyn Codec>> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.codes.contains(&code))?;
        Some(self.entries.remove(index).codec)
    }

    /// Check whether some codec claims `code`
    pub fn supports(&self, code: u32) -> bool {
        self.entries.iter().any(|entry| entry.codes.contains(&code))
    }

    /// Every claimed code, ascending and de-duplicated
    pub fn codes(&self) -> Vec<u32> {
        let all: BTreeSet<u32> = self
            .entries
            .iter()
            .flat_map(|entry| entry.codes.iter().copied())
            .collect();
        all.into_iter().collect()
    }

    /// Number of registered codecs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no codec is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compress `data` with the codec claiming `code`
    pub fn compress(&self, code: u32, data: &[u8]) -> Result<Vec<u8>> {
        self.lookup(code)?.compress(data)
    }

    /// Decompress `data` with the codec claiming `code`
    pub fn decompress(&self, code: u32, data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>> {
        self.lookup(code)?.decompress(data, uncompressed_size)
    }
}

impl fmt::Debug for CompressionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|entry| (entry.codec.name(), &entry.codes)),
            )
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Tagged {
        name: &'static str,
        codes: Vec<u32>,
    }

    impl Tagged {
        fn new(name: &'static str, codes: &[u32]) -> Arc<dyn Codec> {
            Arc::new(Self {
                name,
                codes: codes.to_vec(),
            })
        }
    }

    impl Codec for Tagged {
        fn name(&self) -> &str {
            self.name
        }

        fn codes(&self) -> &[u32] {
            &self.codes
        }

        fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.to_vec())
        }

        fn decompress(&self, data: &[u8], _uncompressed_size: u32) -> Result<Vec<u8>> {
            Ok(data.to_vec())
        }
    }

    #[test]
    fn test_default_codes() {
        let registry = CompressionRegistry::with_defaults();
        assert_eq!(registry.codes(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.lookup(0).expect("identity").name(), "None");
        assert_eq!(registry.lookup(1).expect("deflate").name(), "Deflate");
        assert_eq!(registry.lookup(3).expect("zstd").name(), "Zstd");
        assert_eq!(registry.lookup(5).expect("lz4").name(), "LZ4");
    }

    #[test]
    fn test_unknown_code_rejected_without_mutation() {
        let registry = CompressionRegistry::with_defaults();
        let before = format!("{registry:?}");

        assert!(matches!(
            registry.lookup(6),
            Err(FormatError::UnsupportedCompression(6))
        ));
        assert!(!registry.supports(6));
        assert_eq!(format!("{registry:?}"), before);
    }

    #[test]
    fn test_exact_set_replaces() {
        let mut registry = CompressionRegistry::new();
        registry.register(Tagged::new("first", &[2, 3]));
        let replaced = registry.register(Tagged::new("second", &[3, 2]));

        assert_eq!(replaced.expect("replaced").name(), "first");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(2).expect("lookup").name(), "second");
    }

    #[test]
    fn test_partial_overlap_keeps_first_match() {
        let mut registry = CompressionRegistry::new();
        registry.register(Tagged::new("first", &[2, 3]));
        let replaced = registry.register(Tagged::new("second", &[3, 4]));

        assert!(replaced.is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(3).expect("lookup").name(), "first");
        assert_eq!(registry.lookup(4).expect("lookup").name(), "second");
    }

    #[test]
    fn test_unregister_exposes_next_owner() {
        let mut registry = CompressionRegistry::new();
        registry.register(Tagged::new("first", &[2, 3]));
        registry.register(Tagged::new("second", &[3, 4]));

        let removed = registry.unregister(3).expect("removed");
        assert_eq!(removed.name(), "first");
        assert_eq!(registry.lookup(3).expect("lookup").name(), "second");
        assert!(registry.lookup(2).is_err());
        assert!(registry.unregister(2).is_none());
    }

    #[test]
    fn test_registry_round_trips_every_default_code() {
        let registry = CompressionRegistry::with_defaults();
        let data = b"registry round trip registry round trip registry round trip";

        for code in registry.codes() {
            let packed = registry.compress(code, data).expect("compress");
            let unpacked = registry
                .decompress(code, &packed, data.len() as u32)
                .expect("decompress");
            assert_eq!(unpacked, data, "code {code}");
        }
    }
}
