//! Built-in codecs

use std::io::Read;

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

use super::Codec;
use crate::error::{FormatError, Result};

/// Maximum allowed decompression size (1 GB)
///
/// Limits decompression output so a corrupt size field or a compression
/// bomb cannot exhaust memory.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Largest buffer reserved up front from a recorded size (1 MB)
const MAX_INITIAL_CAPACITY: usize = 1024 * 1024;

fn check_size(uncompressed_size: u32) -> Result<usize> {
    let size = uncompressed_size as usize;
    if size > MAX_DECOMPRESSION_SIZE {
        return Err(FormatError::Compression(format!(
            "decompressed size {size} exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
        )));
    }
    Ok(size)
}

/// Code 0: payload stored as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &str {
        "None"
    }

    fn codes(&self) -> &[u32] {
        &[0]
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _uncompressed_size: u32) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Code 1: zlib-wrapped deflate
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
}

impl DeflateCodec {
    /// Create a deflate codec with a specific level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for DeflateCodec {
    fn name(&self) -> &str {
        "Deflate"
    }

    fn codes(&self) -> &[u32] {
        &[1]
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(data, self.level);
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| FormatError::Compression(format!("deflate compression failed: {e}")))?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        // The recorded size is untrusted; grow past the initial buffer only
        // as bytes are actually decoded
        let capacity = check_size(uncompressed_size)?.min(MAX_INITIAL_CAPACITY);
        let mut decompressed = Vec::with_capacity(capacity);

        // Read in chunks to enforce size limit
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = decoder.read(&mut buffer).map_err(|e| {
                FormatError::Compression(format!("deflate decompression failed: {e}"))
            })?;

            if bytes_read == 0 {
                break;
            }

            if decompressed.len() + bytes_read > MAX_DECOMPRESSION_SIZE {
                return Err(FormatError::Compression(format!(
                    "decompressed size exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
                )));
            }

            decompressed.extend_from_slice(&buffer[..bytes_read]);
        }

        Ok(decompressed)
    }
}

/// Codes 2 and 3: Zstandard frames
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Create a zstd codec with a specific compression level
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &str {
        "Zstd"
    }

    fn codes(&self) -> &[u32] {
        &[2, 3]
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, self.level)
            .map_err(|e| FormatError::Compression(format!("zstd compression failed: {e}")))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>> {
        let capacity = check_size(uncompressed_size)?;
        zstd::bulk::decompress(data, capacity)
            .map_err(|e| FormatError::Compression(format!("zstd decompression failed: {e}")))
    }
}

/// Codes 4 and 5: raw LZ4 blocks
///
/// Blocks carry no size prefix; the chain's uncompressed size sizes the
/// output buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &str {
        "LZ4"
    }

    fn codes(&self) -> &[u32] {
        &[4, 5]
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>> {
        let size = check_size(uncompressed_size)?;
        let decompressed = lz4_flex::block::decompress(data, size)
            .map_err(|e| FormatError::Compression(format!("LZ4 decompression failed: {e}")))?;

        if decompressed.len() != size {
            return Err(FormatError::Compression(format!(
                "LZ4 decompression size mismatch: expected {size}, got {}",
                decompressed.len()
            )));
        }

        Ok(decompressed)
    }
}
