//! Bundle header parsing and building

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};

use crate::constants::{BUNDLE_MAGIC, CHAIN_LENGTH, HEADER_SIZE};
use crate::error::{FormatError, Result};

/// Bundle archive header
///
/// The header occupies the first 32 bytes of every archive:
/// - Magic signature "POTATO70" (8 bytes)
/// - Total file size (4 bytes, little-endian)
/// - Dummy size, reserved (4 bytes)
/// - Index size, 320 bytes per chain (4 bytes)
/// - Unknown, reserved (4 bytes)
/// - Opaque attribute block (8 bytes)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct BundleHeader {
    /// Magic signature, always "POTATO70"
    pub magic: [u8; 8],

    /// Size of the whole archive in bytes
    pub file_size: u32,

    /// Reserved size field, preserved verbatim
    pub dummy_size: u32,

    /// Size of the chain table in bytes
    pub index_size: u32,

    /// Reserved field, preserved verbatim
    pub unknown: u32,

    /// Opaque attribute block, preserved verbatim
    pub attributes: [u8; 8],
}

impl BundleHeader {
    /// Header of an archive that holds no entries
    pub fn empty() -> Self {
        Self {
            magic: BUNDLE_MAGIC,
            file_size: HEADER_SIZE,
            dummy_size: 0,
            index_size: 0,
            unknown: 0,
            attributes: [0; 8],
        }
    }

    /// Parse a header from the first 32 bytes of `data`
    ///
    /// Fails with [`FormatError::InvalidArchive`] when the input is shorter
    /// than a header or the signature is not "POTATO70".
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE as usize {
            return Err(FormatError::invalid_archive(format!(
                "header truncated: {} of {} bytes",
                data.len(),
                HEADER_SIZE
            )));
        }

        let header = Self::read(&mut Cursor::new(&data[..HEADER_SIZE as usize]))?;
        if header.magic != BUNDLE_MAGIC {
            return Err(FormatError::invalid_archive(format!(
                "bad signature {:02X?}",
                header.magic
            )));
        }

        Ok(header)
    }

    /// Serialize to exactly 32 bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_SIZE as usize));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Number of chains in the index
    pub fn entry_count(&self) -> u32 {
        self.index_size / CHAIN_LENGTH
    }

    /// Absolute offset where the packed-data region begins
    pub fn data_region_start(&self) -> u32 {
        self.index_size + HEADER_SIZE
    }

    /// Size of the packed-data region
    ///
    /// Saturates at zero for a header whose sizes do not add up.
    pub fn data_size(&self) -> u32 {
        self.file_size.saturating_sub(self.data_region_start())
    }
}

impl Default for BundleHeader {
    fn default() -> Self {
        Self::empty()
    }
}
