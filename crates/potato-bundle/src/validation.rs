//! Structural validation of bundle archives
//!
//! Checks the layout invariants every successful mutation must preserve:
//!
//! 1. `file_size == 32 + index_size + sum(compressed_size)`
//! 2. chains sit contiguously in `[32, 32 + index_size)` in index order
//! 3. payload ranges lie inside the data region and never overlap
//! 4. entry paths are unique
//!
//! Validation reports every violation instead of stopping at the first one,
//! so a damaged archive can be assessed in one pass.

use std::collections::HashSet;
use std::fmt;

use potato_formats::constants::{CHAIN_LENGTH, HEADER_SIZE};
use potato_formats::{BundleHeader, FileRecord};

/// A single broken invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Header file size disagrees with header + index + payload sizes
    SizeEquation {
        /// `file_size` from the header
        header: u64,
        /// `32 + index_size + sum(compressed_size)`
        expected: u64,
    },
    /// Header file size disagrees with the length of the backing store
    StoreLength {
        /// `file_size` from the header
        header: u64,
        /// Length of the backing store
        actual: u64,
    },
    /// Index size does not match the number of chains
    IndexSize {
        /// `index_size` from the header
        header: u32,
        /// Number of chains held in memory
        records: usize,
    },
    /// A chain is not where its position in the index says it should be
    ChainPosition {
        /// Entry path
        path: String,
        /// Recorded chain position
        actual: u32,
        /// Position implied by index order
        expected: u32,
    },
    /// A payload reaches outside `[data_region_start, file_size)`
    PayloadOutOfBounds {
        /// Entry path
        path: String,
        /// Payload start
        offset: u64,
        /// Payload end (exclusive)
        end: u64,
    },
    /// Two payloads share bytes
    PayloadOverlap {
        /// Entry whose payload starts first
        first: String,
        /// Entry whose payload starts inside the first one
        second: String,
    },
    /// The same path appears more than once
    DuplicatePath(String),
    /// The chain stored on disk differs from the in-memory record
    StaleChain {
        /// Entry path as held in memory
        path: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeEquation { header, expected } => {
                write!(f, "file size {header} != header + index + payloads {expected}")
            }
            Self::StoreLength { header, actual } => {
                write!(f, "file size {header} != store length {actual}")
            }
            Self::IndexSize { header, records } => {
                write!(f, "index size {header} does not hold {records} chains")
            }
            Self::ChainPosition {
                path,
                actual,
                expected,
            } => write!(f, "chain of {path} at {actual}, expected {expected}"),
            Self::PayloadOutOfBounds { path, offset, end } => {
                write!(f, "payload of {path} [{offset}, {end}) outside data region")
            }
            Self::PayloadOverlap { first, second } => {
                write!(f, "payloads of {first} and {second} overlap")
            }
            Self::DuplicatePath(path) => write!(f, "duplicate path {path}"),
            Self::StaleChain { path } => write!(f, "stored chain of {path} is stale"),
        }
    }
}

/// Result of validating an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Every violation found
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Whether no violation was found
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub(crate) fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "valid");
        }
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Check the layout invariants of a header and its records
///
/// `store_len` is the physical length of the backing store, if known.
pub fn validate_layout(
    header: &BundleHeader,
    records: &[FileRecord],
    store_len: Option<u64>,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let file_size = u64::from(header.file_size);

    let payload_total: u64 = records
        .iter()
        .map(|record| u64::from(record.compressed_size))
        .sum();
    let expected = u64::from(HEADER_SIZE) + u64::from(header.index_size) + payload_total;
    if file_size != expected {
        report.push(Violation::SizeEquation {
            header: file_size,
            expected,
        });
    }

    if let Some(actual) = store_len
        && actual != file_size
    {
        report.push(Violation::StoreLength {
            header: file_size,
            actual,
        });
    }

    if u64::from(header.index_size) != records.len() as u64 * u64::from(CHAIN_LENGTH) {
        report.push(Violation::IndexSize {
            header: header.index_size,
            records: records.len(),
        });
    }

    for (i, record) in records.iter().enumerate() {
        let expected = HEADER_SIZE as usize + i * CHAIN_LENGTH as usize;
        if record.chain_position as usize != expected {
            report.push(Violation::ChainPosition {
                path: record.path.clone(),
                actual: record.chain_position,
                expected: expected as u32,
            });
        }
    }

    let data_start = u64::from(header.data_region_start());
    for record in records {
        let range = record.data_range();
        if record.compressed_size > 0 && (range.start < data_start || range.end > file_size) {
            report.push(Violation::PayloadOutOfBounds {
                path: record.path.clone(),
                offset: range.start,
                end: range.end,
            });
        }
    }

    // Sort by start so each payload only needs checking against the furthest
    // reaching payload before it
    let mut spans: Vec<&FileRecord> = records
        .iter()
        .filter(|record| record.compressed_size > 0)
        .collect();
    spans.sort_by_key(|record| record.data_offset);
    let mut reach: Option<&FileRecord> = None;
    for record in spans {
        if let Some(previous) = reach {
            if record.data_range().start < previous.data_range().end {
                report.push(Violation::PayloadOverlap {
                    first: previous.path.clone(),
                    second: record.path.clone(),
                });
            }
            if record.data_range().end > previous.data_range().end {
                reach = Some(record);
            }
        } else {
            reach = Some(record);
        }
    }

    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.path.as_str()) {
            report.push(Violation::DuplicatePath(record.path.clone()));
        }
    }

    report
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use potato_formats::FileTime;

    fn record(path: &str, index: u32, offset: u32, size: u32) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            hash: [0; 16],
            reserved: 0,
            uncompressed_size: size,
            compressed_size: size,
            data_offset: offset,
            timestamp: FileTime::default(),
            reserved2: [0; 16],
            unique_id: index,
            compression: 0,
            chain_position: HEADER_SIZE + index * CHAIN_LENGTH,
        }
    }

    fn header(records: &[FileRecord]) -> BundleHeader {
        let index_size = records.len() as u32 * CHAIN_LENGTH;
        let payload: u32 = records.iter().map(|r| r.compressed_size).sum();
        BundleHeader {
            index_size,
            file_size: HEADER_SIZE + index_size + payload,
            ..BundleHeader::empty()
        }
    }

    // Two chains end at 672
    fn valid_records() -> Vec<FileRecord> {
        vec![record("\\a", 0, 672, 10), record("\\b", 1, 682, 20)]
    }

    #[test]
    fn test_valid_layout() {
        let records = valid_records();
        let report = validate_layout(&header(&records), &records, Some(702));
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.to_string(), "valid");
    }

    #[test]
    fn test_empty_archive() {
        let report = validate_layout(&BundleHeader::empty(), &[], Some(32));
        assert!(report.is_valid());
    }

    #[test]
    fn test_size_equation_and_store_length() {
        let records = valid_records();
        let mut header = header(&records);
        header.file_size += 5;
        let report = validate_layout(&header, &records, Some(702));
        assert!(report.violations.contains(&Violation::SizeEquation {
            header: 707,
            expected: 702
        }));
        assert!(report.violations.contains(&Violation::StoreLength {
            header: 707,
            actual: 702
        }));
    }

    #[test]
    fn test_overlap_detected() {
        let records = vec![record("\\a", 0, 672, 20), record("\\b", 1, 682, 10)];
        let mut header = header(&records);
        header.file_size = 702;
        let report = validate_layout(&header, &records, None);
        assert!(report.violations.contains(&Violation::PayloadOverlap {
            first: "\\a".to_string(),
            second: "\\b".to_string()
        }));
    }

    #[test]
    fn test_out_of_bounds_and_duplicates() {
        let records = vec![record("\\a", 0, 100, 10), record("\\a", 1, 682, 20)];
        let report = validate_layout(&header(&records), &records, None);
        assert!(report.violations.iter().any(|v| matches!(
            v,
            Violation::PayloadOutOfBounds { offset: 100, .. }
        )));
        assert!(
            report
                .violations
                .contains(&Violation::DuplicatePath("\\a".to_string()))
        );
    }

    #[test]
    fn test_chain_position_and_index_size() {
        let mut records = valid_records();
        records[1].chain_position = 700;
        let mut header = header(&records);
        header.index_size = 960;
        let report = validate_layout(&header, &records, None);
        assert!(report.violations.contains(&Violation::ChainPosition {
            path: "\\b".to_string(),
            actual: 700,
            expected: 352
        }));
        assert!(report.violations.contains(&Violation::IndexSize {
            header: 960,
            records: 2
        }));
    }
}
