//! Chain records: the fixed 320-byte index entries describing packed files

use binrw::io::{Cursor, Read, Seek, Write};
use binrw::{BinRead, BinResult, BinWrite};

use crate::constants::{CHAIN_LENGTH, DATA_OFFSET_FIELD, PATH_LENGTH};
use crate::error::{FormatError, Result};
use crate::time::FileTime;

/// One chain of the bundle index
///
/// Layout (320 bytes, little-endian):
///
/// ```text
/// 0x000 path              [u8; 256]  NUL-padded, single-byte codepage
/// 0x100 hash              [u8; 16]   opaque identifier
/// 0x110 reserved          u32        always zero
/// 0x114 uncompressed_size u32
/// 0x118 compressed_size   u32
/// 0x11C data_offset       u32        absolute offset of the payload
/// 0x120 timestamp         i64        Windows FILETIME
/// 0x128 reserved2         [u8; 16]   always zero
/// 0x138 unique_id         u32        opaque identifier
/// 0x13C compression       u32        codec selector
/// ```
///
/// `chain_position` is not part of the on-disk chain. It records where the
/// chain itself lives in the archive and is recomputed whenever the index is
/// parsed or shifted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Entry path
    pub path: String,
    /// Opaque 16-byte identifier, not a checksum
    pub hash: [u8; 16],
    /// Reserved, zero in every known archive
    pub reserved: u32,
    /// Size of the payload before compression
    pub uncompressed_size: u32,
    /// Size of the payload as stored
    pub compressed_size: u32,
    /// Absolute offset of the payload in the archive
    pub data_offset: u32,
    /// Modification time
    pub timestamp: FileTime,
    /// Reserved, zero in every known archive
    pub reserved2: [u8; 16],
    /// Opaque identifier
    pub unique_id: u32,
    /// Codec selector, see [`crate::compression`]
    pub compression: u32,
    /// Absolute offset of this chain's 320-byte slot
    pub chain_position: u32,
}

impl FileRecord {
    /// Parse a chain located at `chain_position`
    pub fn parse(data: &[u8], chain_position: u32) -> Result<Self> {
        if data.len() < CHAIN_LENGTH as usize {
            return Err(FormatError::invalid_archive(format!(
                "chain at {chain_position} truncated: {} of {CHAIN_LENGTH} bytes",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(&data[..CHAIN_LENGTH as usize]);
        Ok(Self::read_options(
            &mut cursor,
            binrw::Endian::Little,
            (chain_position,),
        )?)
    }

    /// Serialize to exactly 320 bytes
    ///
    /// Fails with [`FormatError::PathTooLong`] or [`FormatError::InvalidPath`]
    /// before producing any output when the path cannot be stored.
    pub fn build(&self) -> Result<Vec<u8>> {
        let path = encode_path(&self.path)?;

        let mut cursor = Cursor::new(Vec::with_capacity(CHAIN_LENGTH as usize));
        write_fields(self, &path, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Absolute position of the 4-byte `data_offset` field inside this chain
    pub fn data_offset_position(&self) -> u32 {
        self.chain_position + DATA_OFFSET_FIELD
    }

    /// Byte range `[data_offset, data_offset + compressed_size)` of the payload
    pub fn data_range(&self) -> std::ops::Range<u64> {
        let start = u64::from(self.data_offset);
        start..start + u64::from(self.compressed_size)
    }

    /// Whether the payload is stored without compression
    pub fn is_stored(&self) -> bool {
        self.compression == crate::compression::CODE_NONE
    }

    /// Hash rendered as lowercase hex
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl BinRead for FileRecord {
    type Args<'a> = (u32,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let path = <[u8; PATH_LENGTH]>::read_options(reader, endian, ())?;
        let hash = <[u8; 16]>::read_options(reader, endian, ())?;
        let reserved = u32::read_options(reader, endian, ())?;
        let uncompressed_size = u32::read_options(reader, endian, ())?;
        let compressed_size = u32::read_options(reader, endian, ())?;
        let data_offset = u32::read_options(reader, endian, ())?;
        let timestamp = i64::read_options(reader, endian, ())?;
        let reserved2 = <[u8; 16]>::read_options(reader, endian, ())?;
        let unique_id = u32::read_options(reader, endian, ())?;
        let compression = u32::read_options(reader, endian, ())?;

        Ok(Self {
            path: decode_path(&path),
            hash,
            reserved,
            uncompressed_size,
            compressed_size,
            data_offset,
            timestamp: FileTime::from_ticks(timestamp),
            reserved2,
            unique_id,
            compression,
            chain_position: args.0,
        })
    }
}

impl BinWrite for FileRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let pos = writer.stream_position()?;
        let path = encode_path(&self.path).map_err(|e| binrw::Error::Custom {
            pos,
            err: Box::new(e),
        })?;
        write_fields(self, &path, writer)
    }
}

fn write_fields<W: Write + Seek>(
    record: &FileRecord,
    path: &[u8; PATH_LENGTH],
    writer: &mut W,
) -> BinResult<()> {
    let endian = binrw::Endian::Little;

    path.write_options(writer, endian, ())?;
    record.hash.write_options(writer, endian, ())?;
    record.reserved.write_options(writer, endian, ())?;
    record.uncompressed_size.write_options(writer, endian, ())?;
    record.compressed_size.write_options(writer, endian, ())?;
    record.data_offset.write_options(writer, endian, ())?;
    record.timestamp.ticks().write_options(writer, endian, ())?;
    record.reserved2.write_options(writer, endian, ())?;
    record.unique_id.write_options(writer, endian, ())?;
    record.compression.write_options(writer, endian, ())?;

    Ok(())
}

/// Encode a path into the 256-byte NUL-padded path field
///
/// Characters map one-to-one onto bytes (Latin-1), so every path read from
/// an archive can be written back unchanged. A path must leave room for at
/// least one NUL terminator.
pub fn encode_path(path: &str) -> Result<[u8; PATH_LENGTH]> {
    let mut field = [0u8; PATH_LENGTH];
    let mut length = 0;

    for ch in path.chars() {
        let byte = u8::try_from(u32::from(ch))
            .map_err(|_| FormatError::InvalidPath(path.to_string()))?;
        if byte == 0 {
            return Err(FormatError::InvalidPath(path.to_string()));
        }
        if length >= PATH_LENGTH - 1 {
            return Err(FormatError::PathTooLong {
                length: path.chars().count(),
                max: PATH_LENGTH - 1,
            });
        }
        field[length] = byte;
        length += 1;
    }

    Ok(field)
}

/// Decode the 256-byte path field, dropping the NUL padding
pub fn decode_path(field: &[u8]) -> String {
    let decoded: String = field.iter().map(|&b| char::from(b)).collect();
    decoded.trim_end_matches('\0').to_string()
}
