//! Partition naming and the in-memory form of a yearly partition

use std::collections::BTreeMap;

use crate::models::StreamRecord;

/// File name prefix shared by every yearly partition
const PARTITION_PREFIX: &str = "spotify_data_";
const PARTITION_EXTENSION: &str = "parquet";

/// File name for the partition holding `year`
pub fn partition_file_name(year: i32) -> String {
    format!("{}{:04}.{}", PARTITION_PREFIX, year, PARTITION_EXTENSION)
}

/// Parse the year back out of a partition file name.
///
/// Anything that is not exactly `spotify_data_YYYY.parquet` (temp files,
/// foreign files) yields `None`.
pub fn parse_partition_file_name(name: &str) -> Option<i32> {
    let year = name
        .strip_prefix(PARTITION_PREFIX)?
        .strip_suffix(PARTITION_EXTENSION)?
        .strip_suffix('.')?;

    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}

/// Glob pattern matching every partition file
pub fn glob_pattern() -> String {
    format!("{}*.{}", PARTITION_PREFIX, PARTITION_EXTENSION)
}

/// Group records by the year partition they belong to, keeping input order
pub fn split_by_year(records: &[StreamRecord]) -> BTreeMap<i32, Vec<StreamRecord>> {
    let mut partitions: BTreeMap<i32, Vec<StreamRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.year())
            .or_default()
            .push(record.clone());
    }
    partitions
}

/// A whole yearly partition loaded into memory
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTable {
    pub year: i32,
    pub records: Vec<StreamRecord>,
    /// Whether the file carries the `genres` column
    pub has_genre_column: bool,
}

impl PartitionTable {
    /// A partition that has never been written
    pub fn empty(year: i32) -> Self {
        Self {
            year,
            records: Vec::new(),
            has_genre_column: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rows enrichment has already processed
    pub fn enriched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_enriched()).count()
    }
}
