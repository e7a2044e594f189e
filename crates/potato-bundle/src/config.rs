//! Configuration for opening and editing bundles

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::{DEFAULT_MOVE_BUFFER, MIN_MOVE_BUFFER};
use crate::{BundleError, Result};

/// Configuration for a bundle instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Separator between path segments inside entry paths
    pub path_separator: char,

    /// Buffer size used when shifting bytes for inserts and cuts
    pub move_buffer_size: usize,

    /// Compression code used by `Bundle::create_default`
    pub default_compression: u32,

    /// Sync the backing file to disk after every successful mutation
    pub sync_on_mutation: bool,

    /// Reject archives that fail invariant validation at open time
    pub verify_on_open: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path_separator: '\\',
            move_buffer_size: DEFAULT_MOVE_BUFFER,
            default_compression: 0,
            sync_on_mutation: false,
            verify_on_open: false,
        }
    }
}

impl BundleConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BundleError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Set the path separator
    #[must_use]
    pub const fn with_path_separator(mut self, separator: char) -> Self {
        self.path_separator = separator;
        self
    }

    /// Set the buffer size used to shift bytes
    #[must_use]
    pub const fn with_move_buffer_size(mut self, size: usize) -> Self {
        self.move_buffer_size = size;
        self
    }

    /// Set the compression code used by `create_default`
    #[must_use]
    pub const fn with_default_compression(mut self, code: u32) -> Self {
        self.default_compression = code;
        self
    }

    /// Enable or disable syncing after each mutation
    #[must_use]
    pub const fn with_sync_on_mutation(mut self, enable: bool) -> Self {
        self.sync_on_mutation = enable;
        self
    }

    /// Enable or disable invariant validation at open time
    #[must_use]
    pub const fn with_verify_on_open(mut self, enable: bool) -> Self {
        self.verify_on_open = enable;
        self
    }

    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.path_separator == '\0' || !self.path_separator.is_ascii() {
            return Err(BundleError::InvalidConfig(format!(
                "path separator must be a printable ASCII character, got {:?}",
                self.path_separator
            )));
        }

        if self.move_buffer_size < MIN_MOVE_BUFFER {
            return Err(BundleError::InvalidConfig(format!(
                "move buffer size {} is below the minimum of {MIN_MOVE_BUFFER} bytes",
                self.move_buffer_size
            )));
        }

        Ok(())
    }
}
