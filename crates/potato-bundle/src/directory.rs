//! Folder listing derived from entry paths
//!
//! Bundles store no folder records; folders exist only as prefixes of entry
//! paths. The index is rebuilt from scratch after every mutation.

use std::collections::HashSet;

use crate::path;

/// Folders implied by the current entry paths, in first-seen order
///
/// Folder names are the non-empty path segments joined by the separator,
/// without a leading separator: `\a\b\c.txt` implies `a` and `a\b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryIndex {
    separator: char,
    directories: Vec<String>,
}

impl DirectoryIndex {
    /// Build the index from entry paths
    pub fn build<'a>(paths: impl IntoIterator<Item = &'a str>, separator: char) -> Self {
        let sep = separator.to_string();
        let mut seen = HashSet::new();
        let mut directories = Vec::new();

        for entry in paths {
            let parts: Vec<&str> = path::segments(entry, separator).collect();
            let Some((_, dirs)) = parts.split_last() else {
                continue;
            };

            for depth in 1..=dirs.len() {
                let directory = dirs[..depth].join(&sep);
                if seen.insert(directory.clone()) {
                    directories.push(directory);
                }
            }
        }

        Self {
            separator,
            directories,
        }
    }

    /// Every folder
    pub fn all(&self) -> &[String] {
        &self.directories
    }

    /// Folders whose immediate parent is exactly `parent`
    ///
    /// An empty `parent` yields nothing; use [`Self::roots`] for top-level
    /// folders.
    pub fn sub_directories(&self, parent: &str) -> Vec<String> {
        if parent.is_empty() {
            return Vec::new();
        }

        self.directories
            .iter()
            .filter(|directory| {
                path::raw_parent(directory, self.separator).is_some_and(|p| p == parent)
            })
            .cloned()
            .collect()
    }

    /// First segment of every folder, de-duplicated
    pub fn roots(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.directories
            .iter()
            .filter_map(|directory| directory.split(self.separator).next())
            .filter(|root| seen.insert(*root))
            .map(str::to_string)
            .collect()
    }

    /// Number of folders
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    /// Whether no folder exists
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}
