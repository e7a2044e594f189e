//! The bundle context object

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use potato_formats::{BundleHeader, Codec, FileRecord};
use tracing::{debug, info};

use crate::config::BundleConfig;
use crate::engine::{BundleState, BundleStatus};
use crate::path;
use crate::store::{FileStore, MemoryStore, RangeStore};
use crate::validation::ValidationReport;
use crate::{BundleError, Result};

/// An open POTATO70 bundle
///
/// Each instance owns its header, index, codec registry and backing store.
/// Reads take a shared lock and may run concurrently; mutations take the
/// exclusive lock, so one instance never interleaves two mutations.
///
/// # Examples
///
/// ```no_run
/// use potato_bundle::Bundle;
///
/// let bundle = Bundle::open("data.bundle")?;
/// bundle.create(b"hello", "\\docs\\readme.txt", 1, false)?;
/// assert_eq!(bundle.read_all("\\docs\\readme.txt")?, b"hello");
/// # Ok::<(), potato_bundle::BundleError>(())
/// ```
#[derive(Debug)]
pub struct Bundle<S: RangeStore = FileStore> {
    state: RwLock<BundleState<S>>,
    config: BundleConfig,
}

impl Bundle<FileStore> {
    /// Open an existing bundle file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, BundleConfig::default())
    }

    /// Open an existing bundle file with a custom configuration
    pub fn open_with_config(path: impl AsRef<Path>, config: BundleConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let store = FileStore::open(path, config.move_buffer_size)?;
        let bundle = Self::from_store_with_config(store, config)?;
        info!(path = %path.display(), entries = bundle.len(), "opened bundle");
        Ok(bundle)
    }

    /// Write a new header-only bundle and open it
    ///
    /// Fails if the file already exists.
    pub fn create_empty(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_empty_with_config(path, BundleConfig::default())
    }

    /// Write a new header-only bundle with a custom configuration
    pub fn create_empty_with_config(path: impl AsRef<Path>, config: BundleConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let header = BundleHeader::empty().build()?;
        let store = FileStore::create_new(path, &header, config.move_buffer_size)?;
        info!(path = %path.display(), "created empty bundle");
        Self::from_store_with_config(store, config)
    }

    /// Path of the backing file
    pub fn path(&self) -> PathBuf {
        self.state.read().store.path().to_path_buf()
    }
}

impl Bundle<MemoryStore> {
    /// Create an empty bundle held in memory
    pub fn in_memory() -> Result<Self> {
        let header = BundleHeader::empty().build()?;
        Self::from_store(MemoryStore::new(header))
    }
}

impl<S: RangeStore> Bundle<S> {
    /// Open a bundle over any store
    pub fn from_store(store: S) -> Result<Self> {
        Self::from_store_with_config(store, BundleConfig::default())
    }

    /// Open a bundle over any store with a custom configuration
    pub fn from_store_with_config(store: S, config: BundleConfig) -> Result<Self> {
        config.validate()?;
        let state = BundleState::load(store, &config)?;
        debug!(
            entries = state.records.len(),
            file_size = state.header.file_size,
            "loaded bundle index"
        );
        Ok(Self {
            state: RwLock::new(state),
            config,
        })
    }

    /// Close the bundle and hand back its store
    pub fn into_store(self) -> S {
        self.state.into_inner().store
    }

    /// Configuration this bundle was opened with
    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn status(&self) -> BundleStatus {
        self.state.read().status
    }

    /// Copy of the current header
    pub fn header(&self) -> BundleHeader {
        self.state.read().header.clone()
    }

    /// Copy of every record, in index order
    pub fn records(&self) -> Vec<FileRecord> {
        self.state.read().records.clone()
    }

    /// Record of one entry
    pub fn get(&self, path: &str) -> Option<FileRecord> {
        let state = self.state.read();
        state.position(path).map(|index| state.records[index].clone())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the bundle holds no entries
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Every entry path, in index order
    pub fn list_files(&self) -> Vec<String> {
        self.state
            .read()
            .records
            .iter()
            .map(|record| record.path.clone())
            .collect()
    }

    /// Whether an entry with this exact path exists
    pub fn exists(&self, path: &str) -> bool {
        self.state.read().position(path).is_some()
    }

    /// Entries whose file name contains `name`
    pub fn find(&self, name: &str) -> Vec<String> {
        let state = self.state.read();
        let separator = state.separator();
        state
            .records
            .iter()
            .filter(|record| path::file_name(&record.path, separator).contains(name))
            .map(|record| record.path.clone())
            .collect()
    }

    /// Entries that sit directly in the root folder
    pub fn root_files(&self) -> Vec<String> {
        self.files_in("")
    }

    /// Entries whose folder is exactly `folder`
    ///
    /// Leading, trailing and doubled separators in `folder` are ignored.
    pub fn files_in(&self, folder: &str) -> Vec<String> {
        let state = self.state.read();
        let separator = state.separator();
        let folder = path::normalize(folder, separator);
        state
            .records
            .iter()
            .filter(|record| path::folder(&record.path, separator) == folder)
            .map(|record| record.path.clone())
            .collect()
    }

    /// Read and decompress an entry
    pub fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        self.state.read().read_entry(path, true)
    }

    /// Read an entry as stored, without decompressing it
    pub fn read_raw(&self, path: &str) -> Result<Vec<u8>> {
        self.state.read().read_entry(path, false)
    }

    /// Write one entry to `out_dir/<file name>`, returning the written path
    ///
    /// Fails with [`BundleError::InvalidPath`] when the entry's file name is
    /// not a single plain component (`..`, empty, or containing `/` or `\`).
    pub fn export(&self, path: &str, out_dir: impl AsRef<Path>, decompress: bool) -> Result<PathBuf> {
        let state = self.state.read();
        let data = state.read_entry(path, decompress)?;
        let name = export_name(path, state.separator())?;
        let target = out_dir.as_ref().join(name);

        std::fs::create_dir_all(out_dir.as_ref())?;
        std::fs::write(&target, data)?;
        debug!(entry = path, target = %target.display(), "exported entry");
        Ok(target)
    }

    /// Export several entries, skipping paths that do not exist
    pub fn export_many<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a str>,
        out_dir: impl AsRef<Path>,
        decompress: bool,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for path in paths {
            match self.export(path, out_dir.as_ref(), decompress) {
                Ok(target) => written.push(target),
                Err(BundleError::NotFound(missing)) => {
                    debug!(entry = %missing, "skipping missing entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Add an entry compressed with codec `compression`
    ///
    /// With `overwrite` set an existing entry is replaced using its own codec;
    /// otherwise an existing path fails with [`BundleError::AlreadyExists`].
    pub fn create(&self, data: &[u8], path: &str, compression: u32, overwrite: bool) -> Result<()> {
        self.state
            .write()
            .create(data, path, compression, overwrite)
    }

    /// Add an entry using the configured default codec
    pub fn create_default(&self, data: &[u8], path: &str) -> Result<()> {
        self.create(data, path, self.config.default_compression, false)
    }

    /// Replace the payload of an existing entry
    pub fn overwrite(&self, path: &str, data: &[u8]) -> Result<()> {
        self.state.write().overwrite(path, data)
    }

    /// Rename an entry within its folder
    pub fn rename(&self, path: &str, new_name: &str) -> Result<()> {
        self.state.write().rename(path, new_name)
    }

    /// Move an entry to a new path
    pub fn move_file(&self, path: &str, destination: &str, overwrite: bool) -> Result<()> {
        self.state.write().move_file(path, destination, overwrite)
    }

    /// Remove an entry
    pub fn delete(&self, path: &str) -> Result<()> {
        self.state.write().delete(path)
    }

    /// Every folder implied by the entry paths
    pub fn list_directories(&self) -> Vec<String> {
        self.state.read().directories.all().to_vec()
    }

    /// Folders directly below `parent`
    pub fn list_sub_directories(&self, parent: &str) -> Vec<String> {
        self.state.read().directories.sub_directories(parent)
    }

    /// Top-level folders
    pub fn list_root_directories(&self) -> Vec<String> {
        self.state.read().directories.roots()
    }

    /// Register a codec for this bundle, returning the one it replaced
    pub fn register_codec(&self, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        self.state.write().registry.register(codec)
    }

    /// Remove the codec that owns `code`
    pub fn unregister_codec(&self, code: u32) -> Option<Arc<dyn Codec>> {
        self.state.write().registry.unregister(code)
    }

    /// Whether some codec claims `code`
    pub fn supports_compression(&self, code: u32) -> bool {
        self.state.read().registry.supports(code)
    }

    /// Check the archive layout and every stored chain
    pub fn verify(&self) -> ValidationReport {
        self.state.read().verify()
    }

    /// Push buffered writes to durable storage
    pub fn flush(&self) -> Result<()> {
        self.state.write().sync()
    }
}

/// File name an entry is exported under, confined to the output folder
fn export_name(path: &str, separator: char) -> Result<&str> {
    let name = path::file_name(path, separator);
    let mut components = Path::new(name).components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(single)), None)
            if single == name && !name.contains(['/', '\\']) =>
        {
            Ok(name)
        }
        _ => Err(BundleError::InvalidPath(path.to_string())),
    }
}
