//! Random-access byte stores backing a bundle
//!
//! A bundle is edited through four primitives over a single byte sequence:
//! ranged read, ranged write, insert (shift the tail right) and cut (shift
//! the tail left). [`FileStore`] implements them over a file on disk by
//! moving the tail in bounded chunks; [`MemoryStore`] implements them over a
//! `Vec<u8>`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::trace;

/// Minimum buffer used to shift bytes inside a file (4 KiB)
pub const MIN_MOVE_BUFFER: usize = 4 * 1024;

/// Default buffer used to shift bytes inside a file (1 MiB)
pub const DEFAULT_MOVE_BUFFER: usize = 1024 * 1024;

/// Byte-range primitives the mutation engine is written against
///
/// Offsets are absolute. Every method either completes or returns an I/O
/// error; a failed `insert_range`/`cut_range` may leave the tail partially
/// shifted.
pub trait RangeStore: Send + Sync {
    /// Current length in bytes
    fn len(&self) -> io::Result<u64>;

    /// Whether the store holds no bytes
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read `len` bytes at `offset`
    ///
    /// Reading past the end is an error.
    fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Overwrite bytes at `offset`, growing the store if the write runs past
    /// the end
    ///
    /// `offset` itself must not be past the end.
    fn write_range(&mut self, data: &[u8], offset: u64) -> io::Result<()>;

    /// Insert `data` at `offset`, shifting every following byte right
    fn insert_range(&mut self, data: &[u8], offset: u64) -> io::Result<()>;

    /// Remove `len` bytes at `offset`, shifting every following byte left
    fn cut_range(&mut self, offset: u64, len: u64) -> io::Result<()>;

    /// Append `data` at the end, returning the offset it was written at
    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let end = self.len()?;
        self.write_range(data, end)?;
        Ok(end)
    }

    /// Push buffered writes to durable storage
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn past_end(what: &str, offset: u64, len: u64, size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{what} beyond store bounds: {offset} + {len} > {size}"),
    )
}

/// Chunked mover shifting a byte range within one file
///
/// The buffer is allocated once and reused for every shift.
#[derive(Debug)]
pub struct RangeMover {
    buffer: Vec<u8>,
    bytes_moved: u64,
}

impl RangeMover {
    /// Create a mover with the given buffer size, clamped to [`MIN_MOVE_BUFFER`]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer: vec![0u8; buffer_size.max(MIN_MOVE_BUFFER)],
            bytes_moved: 0,
        }
    }

    /// Per-chunk buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes moved so far
    pub const fn bytes_moved(&self) -> u64 {
        self.bytes_moved
    }

    /// Move `[start, end)` to `[start + by, end + by)`, last chunk first
    pub fn shift_right(&mut self, file: &mut File, start: u64, end: u64, by: u64) -> io::Result<()> {
        let mut remaining = end.saturating_sub(start);

        while remaining > 0 {
            let chunk = remaining.min(self.buffer.len() as u64);
            let src = start + remaining - chunk;
            self.copy_chunk(file, src, src + by, chunk as usize)?;
            remaining -= chunk;
        }

        Ok(())
    }

    /// Move `[start, end)` to `[start - by, end - by)`, first chunk first
    pub fn shift_left(&mut self, file: &mut File, start: u64, end: u64, by: u64) -> io::Result<()> {
        let mut pos = start;

        while pos < end {
            let chunk = (end - pos).min(self.buffer.len() as u64);
            self.copy_chunk(file, pos, pos - by, chunk as usize)?;
            pos += chunk;
        }

        Ok(())
    }

    fn copy_chunk(&mut self, file: &mut File, src: u64, dest: u64, len: usize) -> io::Result<()> {
        let buf = &mut self.buffer[..len];

        file.seek(SeekFrom::Start(src))?;
        file.read_exact(buf)?;
        file.seek(SeekFrom::Start(dest))?;
        file.write_all(buf)?;

        self.bytes_moved += len as u64;
        Ok(())
    }
}

/// Store backed by a file on disk
///
/// The handle stays open for the lifetime of the store. Reads go through an
/// internal lock so concurrent readers never interleave their seeks.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
    mover: RangeMover,
}

impl FileStore {
    /// Open an existing file for reading and writing
    pub fn open(path: impl AsRef<Path>, move_buffer_size: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            mover: RangeMover::new(move_buffer_size),
        })
    }

    /// Create a new file holding `initial`, failing if the file exists
    pub fn create_new(
        path: impl AsRef<Path>,
        initial: &[u8],
        move_buffer_size: usize,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(initial)?;
        file.flush()?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            mover: RangeMover::new(move_buffer_size),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeStore for FileStore {
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut file = self.file.lock();
        let size = file.metadata()?.len();
        if offset + len as u64 > size {
            return Err(past_end("read", offset, len as u64, size));
        }

        let mut data = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut data)?;
        Ok(data)
    }

    fn write_range(&mut self, data: &[u8], offset: u64) -> io::Result<()> {
        let file = self.file.get_mut();
        let size = file.metadata()?.len();
        if offset > size {
            return Err(past_end("write", offset, data.len() as u64, size));
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn insert_range(&mut self, data: &[u8], offset: u64) -> io::Result<()> {
        let file = self.file.get_mut();
        let size = file.metadata()?.len();
        if offset > size {
            return Err(past_end("insert", offset, data.len() as u64, size));
        }

        let by = data.len() as u64;
        trace!(offset, len = by, tail = size - offset, "shifting tail right");

        file.set_len(size + by)?;
        self.mover.shift_right(file, offset, size, by)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn cut_range(&mut self, offset: u64, len: u64) -> io::Result<()> {
        let file = self.file.get_mut();
        let size = file.metadata()?.len();
        if offset + len > size {
            return Err(past_end("cut", offset, len, size));
        }

        trace!(offset, len, tail = size - offset - len, "shifting tail left");

        self.mover.shift_left(file, offset + len, size, len)?;
        file.set_len(size - len)
    }

    fn sync(&mut self) -> io::Result<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_data()
    }
}

/// Store backed by an in-memory buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    data: Vec<u8>,
}

impl MemoryStore {
    /// Wrap existing bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Borrow the current bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the current bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for MemoryStore {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl RangeStore for MemoryStore {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_range(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let size = self.data.len() as u64;
        if offset + len as u64 > size {
            return Err(past_end("read", offset, len as u64, size));
        }

        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn write_range(&mut self, data: &[u8], offset: u64) -> io::Result<()> {
        let size = self.data.len() as u64;
        if offset > size {
            return Err(past_end("write", offset, data.len() as u64, size));
        }

        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn insert_range(&mut self, data: &[u8], offset: u64) -> io::Result<()> {
        let size = self.data.len() as u64;
        if offset > size {
            return Err(past_end("insert", offset, data.len() as u64, size));
        }

        let start = offset as usize;
        self.data.splice(start..start, data.iter().copied());
        Ok(())
    }

    fn cut_range(&mut self, offset: u64, len: u64) -> io::Result<()> {
        let size = self.data.len() as u64;
        if offset + len > size {
            return Err(past_end("cut", offset, len, size));
        }

        let start = offset as usize;
        self.data.drain(start..start + len as usize);
        Ok(())
    }
}
