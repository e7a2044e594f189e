//! In-place mutation engine
//!
//! Every mutation is a short sequence of byte-range edits on the backing
//! store. Inserting or cutting bytes moves everything behind them, so each
//! edit is followed by patching the `data_offset` field of every chain whose
//! payload moved. The header is written last.
//!
//! Mutations validate their inputs before touching the store. Once the first
//! byte has been written, any failure marks the state
//! [`BundleStatus::Inconsistent`] and the instance refuses further store
//! access until it is reopened.

use std::collections::HashSet;
use std::io;

use potato_formats::constants::{CHAIN_LENGTH, HEADER_SIZE};
use potato_formats::{BundleHeader, CompressionRegistry, FileRecord, FileTime, encode_path};
use rand::{RngExt, rng};
use tracing::{debug, trace, warn};

use crate::config::BundleConfig;
use crate::directory::DirectoryIndex;
use crate::path;
use crate::store::RangeStore;
use crate::validation::{ValidationReport, Violation, validate_layout};
use crate::{BundleError, Result};

/// Largest archive the 32-bit size fields can describe
const MAX_BUNDLE_SIZE: u64 = u32::MAX as u64;

/// Upper bound (exclusive) of generated unique ids
const MAX_UNIQUE_ID: u32 = i32::MAX as u32;

/// Lifecycle state of an open bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    /// Index loaded and consistent with the store
    Open,
    /// A mutation failed part way; the store no longer matches the index
    Inconsistent,
}

/// Header, index and store of one bundle
#[derive(Debug)]
pub(crate) struct BundleState<S> {
    pub(crate) store: S,
    pub(crate) header: BundleHeader,
    pub(crate) records: Vec<FileRecord>,
    pub(crate) directories: DirectoryIndex,
    pub(crate) registry: CompressionRegistry,
    pub(crate) status: BundleStatus,
    separator: char,
    sync_on_mutation: bool,
    retired_hashes: HashSet<[u8; 16]>,
    retired_ids: HashSet<u32>,
}

impl<S: RangeStore> BundleState<S> {
    /// Read the header and every chain from `store`
    pub(crate) fn load(store: S, config: &BundleConfig) -> Result<Self> {
        let store_len = store.len()?;
        if store_len < u64::from(HEADER_SIZE) {
            return Err(BundleError::InvalidArchive(format!(
                "file holds {store_len} bytes, smaller than the {HEADER_SIZE}-byte header"
            )));
        }

        let header = BundleHeader::parse(&store.read_range(0, HEADER_SIZE as usize)?)?;

        if header.index_size % CHAIN_LENGTH != 0 {
            return Err(BundleError::InvalidArchive(format!(
                "index size {} is not a multiple of {CHAIN_LENGTH}",
                header.index_size
            )));
        }
        let index_end = u64::from(HEADER_SIZE) + u64::from(header.index_size);
        if index_end > store_len {
            return Err(BundleError::InvalidArchive(format!(
                "index ends at {index_end}, past the end of a {store_len}-byte file"
            )));
        }
        if header.file_size < header.data_region_start() {
            return Err(BundleError::InvalidArchive(format!(
                "file size {} is smaller than header and index",
                header.file_size
            )));
        }

        let index = store.read_range(u64::from(HEADER_SIZE), header.index_size as usize)?;
        let records = index
            .chunks_exact(CHAIN_LENGTH as usize)
            .zip(0u32..)
            .map(|(chain, i)| FileRecord::parse(chain, HEADER_SIZE + i * CHAIN_LENGTH))
            .collect::<potato_formats::Result<Vec<_>>>()?;

        if u64::from(header.file_size) != store_len {
            warn!(
                header = header.file_size,
                actual = store_len,
                "bundle file size does not match its header"
            );
        }

        let mut state = Self {
            store,
            header,
            records,
            directories: DirectoryIndex::default(),
            registry: CompressionRegistry::with_defaults(),
            status: BundleStatus::Open,
            separator: config.path_separator,
            sync_on_mutation: config.sync_on_mutation,
            retired_hashes: HashSet::new(),
            retired_ids: HashSet::new(),
        };
        state.rebuild_directories();

        if config.verify_on_open {
            let report = state.verify();
            if !report.is_valid() {
                return Err(BundleError::InvalidArchive(report.to_string()));
            }
        }

        Ok(state)
    }

    pub(crate) fn separator(&self) -> char {
        self.separator
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.status {
            BundleStatus::Open => Ok(()),
            BundleStatus::Inconsistent => Err(BundleError::Inconsistent),
        }
    }

    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        self.records.iter().position(|record| record.path == path)
    }

    fn require(&self, path: &str) -> Result<usize> {
        self.position(path)
            .ok_or_else(|| BundleError::NotFound(path.to_string()))
    }

    /// Read the payload of an entry, decompressed or as stored
    pub(crate) fn read_entry(&self, path: &str, decompress: bool) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let record = &self.records[self.require(path)?];

        let raw = self
            .store
            .read_range(u64::from(record.data_offset), record.compressed_size as usize)?;
        if !decompress {
            return Ok(raw);
        }

        Ok(self
            .registry
            .decompress(record.compression, &raw, record.uncompressed_size)?)
    }

    /// Add an entry, or replace it when `overwrite` is set
    pub(crate) fn create(
        &mut self,
        data: &[u8],
        path: &str,
        compression: u32,
        overwrite: bool,
    ) -> Result<()> {
        self.ensure_open()?;

        if let Some(index) = self.position(path) {
            if !overwrite {
                return Err(BundleError::AlreadyExists(path.to_string()));
            }
            return self.overwrite_at(index, data);
        }

        encode_path(path)?;
        let codec = self.registry.lookup(compression)?;
        let payload = codec.compress(data)?;
        let uncompressed_size = size_u32(data.len())?;
        let compressed_size = size_u32(payload.len())?;
        check_capacity(
            self.header.file_size,
            u64::from(CHAIN_LENGTH) + u64::from(compressed_size),
        )?;

        let (hash, unique_id) = self.fresh_ids();
        let record = FileRecord {
            path: path.to_string(),
            hash,
            reserved: 0,
            uncompressed_size,
            compressed_size,
            // Inserting the chain pushes the current end of file right by
            // one chain, which is where the payload will be appended
            data_offset: self.header.file_size + CHAIN_LENGTH,
            timestamp: FileTime::now(),
            reserved2: [0; 16],
            unique_id,
            compression,
            chain_position: self.header.index_size + HEADER_SIZE,
        };
        let chain = record.build()?;

        debug!(
            path,
            codec = codec.name(),
            uncompressed_size,
            compressed_size,
            "creating entry"
        );
        self.commit("create", |state| state.apply_create(record, &chain, &payload))
    }

    fn apply_create(&mut self, record: FileRecord, chain: &[u8], payload: &[u8]) -> Result<()> {
        debug!(position = record.chain_position, "inserting chain");
        self.store
            .insert_range(chain, u64::from(record.chain_position))?;
        self.header.index_size += CHAIN_LENGTH;
        self.header.file_size += CHAIN_LENGTH;

        debug!(count = self.records.len(), "shifting payload offsets right");
        for existing in &mut self.records {
            existing.data_offset += CHAIN_LENGTH;
            write_offset(&mut self.store, existing)?;
        }

        self.store
            .write_range(payload, u64::from(self.header.file_size))?;
        self.header.file_size += record.compressed_size;

        self.write_header()?;
        self.records.push(record);
        self.rebuild_directories();
        Ok(())
    }

    /// Replace the payload of an existing entry, keeping its codec
    pub(crate) fn overwrite(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let index = self.require(path)?;
        self.overwrite_at(index, data)
    }

    fn overwrite_at(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let record = &self.records[index];
        let codec = self.registry.lookup(record.compression)?;
        let payload = codec.compress(data)?;
        let uncompressed_size = size_u32(data.len())?;
        let compressed_size = size_u32(payload.len())?;
        if compressed_size > record.compressed_size {
            check_capacity(
                self.header.file_size,
                u64::from(compressed_size - record.compressed_size),
            )?;
        }

        debug!(
            path = %record.path,
            old_size = record.compressed_size,
            new_size = compressed_size,
            "overwriting entry"
        );
        self.commit("overwrite", |state| {
            state.apply_overwrite(index, &payload, uncompressed_size)
        })
    }

    fn apply_overwrite(&mut self, index: usize, payload: &[u8], uncompressed_size: u32) -> Result<()> {
        let old = self.records[index].clone();
        let new_size = size_u32(payload.len())?;

        let mut updated = old.clone();
        updated.uncompressed_size = uncompressed_size;
        updated.compressed_size = new_size;
        updated.timestamp = FileTime::now();

        if new_size <= old.compressed_size {
            self.store
                .write_range(payload, u64::from(old.data_offset))?;

            let freed = old.compressed_size - new_size;
            if freed > 0 {
                debug!(freed, "reclaiming bytes after shrunk payload");
                self.store
                    .cut_range(u64::from(old.data_offset + new_size), u64::from(freed))?;
                self.shift_payloads_after(old.data_offset, freed)?;
                self.header.file_size = lower(self.header.file_size, freed, "file size")?;
            }
        } else {
            debug!("relocating grown payload to the end of the file");
            self.store
                .cut_range(u64::from(old.data_offset), u64::from(old.compressed_size))?;
            self.shift_payloads_after(old.data_offset, old.compressed_size)?;
            self.header.file_size =
                lower(self.header.file_size, old.compressed_size, "file size")?;

            updated.data_offset = self.header.file_size;
            self.store
                .write_range(payload, u64::from(updated.data_offset))?;
            self.header.file_size += new_size;
        }

        self.store
            .write_range(&updated.build()?, u64::from(updated.chain_position))?;
        self.write_header()?;
        self.records[index] = updated;
        Ok(())
    }

    /// Move every payload starting after `offset` left by `by` bytes
    fn shift_payloads_after(&mut self, offset: u32, by: u32) -> Result<()> {
        for record in &mut self.records {
            if record.data_offset > offset {
                record.data_offset = lower(record.data_offset, by, "data offset")?;
                write_offset(&mut self.store, record)?;
            }
        }
        Ok(())
    }

    /// Give an entry a new file name inside its current folder
    pub(crate) fn rename(&mut self, path: &str, new_name: &str) -> Result<()> {
        self.ensure_open()?;
        let index = self.require(path)?;

        if new_name.is_empty() || new_name.contains(self.separator) {
            return Err(BundleError::InvalidPath(new_name.to_string()));
        }

        let new_path = path::sibling(path, new_name, self.separator);
        if self.position(&new_path).is_some() {
            return Err(BundleError::AlreadyExists(new_path));
        }

        debug!(from = path, to = %new_path, "renaming entry");
        self.write_path(index, new_path)
    }

    /// Move an entry to `destination`, replacing it when `overwrite` is set
    pub(crate) fn move_file(&mut self, path: &str, destination: &str, overwrite: bool) -> Result<()> {
        self.ensure_open()?;
        let index = self.require(path)?;
        if path == destination {
            return Ok(());
        }

        if let Some(target) = self.position(destination) {
            if !overwrite {
                return Err(BundleError::AlreadyExists(destination.to_string()));
            }

            debug!(from = path, to = destination, "moving entry over existing entry");
            let data = self.read_entry(path, true)?;
            self.overwrite_at(target, &data)?;
            return self.delete(path);
        }

        debug!(from = path, to = destination, "moving entry");
        self.write_path(index, destination.to_string())
    }

    /// Patch the path field of one chain
    ///
    /// This is a single write, so a failure leaves the archive consistent.
    fn write_path(&mut self, index: usize, new_path: String) -> Result<()> {
        let field = encode_path(&new_path)?;
        let position = self.records[index].chain_position;

        self.store.write_range(&field, u64::from(position))?;
        self.records[index].path = new_path;
        self.rebuild_directories();
        self.sync_if_configured()
    }

    /// Remove an entry and its payload
    pub(crate) fn delete(&mut self, path: &str) -> Result<()> {
        self.ensure_open()?;
        let index = self.require(path)?;
        let victim = self.records[index].clone();

        // Where the payload sits once the chain in front of it is gone
        let payload_at = victim.data_offset.checked_sub(CHAIN_LENGTH).ok_or_else(|| {
            BundleError::InvalidArchive(format!(
                "payload of {path} at {} lies inside the index",
                victim.data_offset
            ))
        })?;

        debug!(
            path,
            chain = victim.chain_position,
            size = victim.compressed_size,
            "deleting entry"
        );
        self.commit("delete", |state| state.apply_delete(index, &victim, payload_at))
    }

    fn apply_delete(&mut self, index: usize, victim: &FileRecord, payload_at: u32) -> Result<()> {
        debug!(position = victim.chain_position, "cutting chain");
        self.store
            .cut_range(u64::from(victim.chain_position), u64::from(CHAIN_LENGTH))?;
        self.header.file_size = lower(self.header.file_size, CHAIN_LENGTH, "file size")?;
        self.header.index_size = lower(self.header.index_size, CHAIN_LENGTH, "index size")?;

        debug!(offset = payload_at, len = victim.compressed_size, "cutting payload");
        self.store
            .cut_range(u64::from(payload_at), u64::from(victim.compressed_size))?;
        self.header.file_size =
            lower(self.header.file_size, victim.compressed_size, "file size")?;

        self.records.remove(index);

        for record in &mut self.records {
            if record.chain_position > victim.chain_position {
                record.chain_position -= CHAIN_LENGTH;
            }
        }

        debug!(count = self.records.len(), "shifting payload offsets left");
        for record in &mut self.records {
            record.data_offset = lower(record.data_offset, CHAIN_LENGTH, "data offset")?;
            write_offset(&mut self.store, record)?;
        }

        // Compared in the shifted frame, so `payload_at` is the victim's start
        for record in &mut self.records {
            if record.data_offset > payload_at {
                record.data_offset =
                    lower(record.data_offset, victim.compressed_size, "data offset")?;
                write_offset(&mut self.store, record)?;
            }
        }

        self.write_header()?;
        self.retired_hashes.insert(victim.hash);
        self.retired_ids.insert(victim.unique_id);
        self.rebuild_directories();
        Ok(())
    }

    /// Check the layout invariants and compare every chain with the store
    pub(crate) fn verify(&self) -> ValidationReport {
        let store_len = self.store.len().ok();
        let mut report = validate_layout(&self.header, &self.records, store_len);

        for record in &self.records {
            let stored = self
                .store
                .read_range(u64::from(record.chain_position), CHAIN_LENGTH as usize)
                .ok()
                .and_then(|chain| FileRecord::parse(&chain, record.chain_position).ok());
            if stored.as_ref() != Some(record) {
                report.push(Violation::StaleChain {
                    path: record.path.clone(),
                });
            }
        }

        for violation in &report.violations {
            warn!(%violation, "bundle validation failed");
        }
        report
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        self.store.sync()?;
        Ok(())
    }

    /// Run the physical part of a mutation
    ///
    /// A failure past this point leaves the store out of step with the
    /// in-memory index.
    fn commit(&mut self, operation: &'static str, apply: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if let Err(error) = apply(self) {
            warn!(operation, %error, "mutation failed part way, bundle is now inconsistent");
            self.status = BundleStatus::Inconsistent;
            return Err(error);
        }
        self.sync_if_configured()
    }

    fn sync_if_configured(&mut self) -> Result<()> {
        if self.sync_on_mutation {
            self.store.sync()?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.store.write_range(&self.header.build()?, 0)?;
        Ok(())
    }

    pub(crate) fn rebuild_directories(&mut self) {
        self.directories = DirectoryIndex::build(
            self.records.iter().map(|record| record.path.as_str()),
            self.separator,
        );
    }

    /// Random identifiers not held by any live or deleted entry
    fn fresh_ids(&self) -> ([u8; 16], u32) {
        let mut rng = rng();

        let hash = loop {
            let candidate: [u8; 16] = rng.random();
            if !self.retired_hashes.contains(&candidate)
                && !self.records.iter().any(|record| record.hash == candidate)
            {
                break candidate;
            }
        };

        let unique_id = loop {
            let candidate = rng.random_range(0..MAX_UNIQUE_ID);
            if !self.retired_ids.contains(&candidate)
                && !self.records.iter().any(|record| record.unique_id == candidate)
            {
                break candidate;
            }
        };

        (hash, unique_id)
    }
}

/// Persist the 4-byte `data_offset` field of one chain
fn write_offset<S: RangeStore>(store: &mut S, record: &FileRecord) -> io::Result<()> {
    trace!(
        path = %record.path,
        data_offset = record.data_offset,
        "patching data offset"
    );
    store.write_range(
        &record.data_offset.to_le_bytes(),
        u64::from(record.data_offset_position()),
    )
}

fn lower(value: u32, by: u32, field: &str) -> Result<u32> {
    value.checked_sub(by).ok_or_else(|| {
        BundleError::InvalidArchive(format!("{field} {value} cannot shrink by {by}"))
    })
}

fn size_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| BundleError::CapacityExceeded {
        size: len as u64,
        max: MAX_BUNDLE_SIZE,
    })
}

fn check_capacity(file_size: u32, growth: u64) -> Result<()> {
    let size = u64::from(file_size) + growth;
    if size > MAX_BUNDLE_SIZE {
        return Err(BundleError::CapacityExceeded {
            size,
            max: MAX_BUNDLE_SIZE,
        });
    }
    Ok(())
}
