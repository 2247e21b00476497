//! Consolidation: sort, deduplicate and atomically rewrite a partition

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::StreamRecord;
use crate::storage::PartitionStore;

/// Which columns make two events "the same" during consolidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DedupKey {
    /// Same timestamp, same track URI and same play duration
    #[default]
    TimestampTrackDuration,
    /// Every recognized column equal (genres are ignored)
    ExactRow,
}

#[derive(PartialEq, Eq, Hash)]
enum RecordKey {
    TimestampTrackDuration(DateTime<Utc>, Option<String>, u64),
    ExactRow(StreamRecord),
}

impl DedupKey {
    fn key_of(self, record: &StreamRecord) -> RecordKey {
        match self {
            DedupKey::TimestampTrackDuration => RecordKey::TimestampTrackDuration(
                record.ts,
                record.track_uri.clone(),
                record.ms_played,
            ),
            DedupKey::ExactRow => RecordKey::ExactRow(record.without_genres()),
        }
    }
}

/// Row counts of one consolidated partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub year: i32,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl ConsolidationStats {
    pub fn duplicates_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Sort records by timestamp and drop duplicates.
///
/// The sort is stable and the first occurrence of a key wins, so rows that
/// were already committed (and possibly enriched) survive re-ingestion of the
/// same events.
pub fn consolidate_records(mut records: Vec<StreamRecord>, key: DedupKey) -> Vec<StreamRecord> {
    records.sort_by_key(|r| r.ts);

    let mut seen = HashSet::with_capacity(records.len());
    records.retain(|r| seen.insert(key.key_of(r)));
    records
}

/// Consolidate one partition on disk
pub fn consolidate_partition(
    store: &PartitionStore,
    year: i32,
    key: DedupKey,
) -> Result<ConsolidationStats> {
    let mut table = store.load(year)?;
    let rows_before = table.len();

    table.records = consolidate_records(std::mem::take(&mut table.records), key);
    store.replace(&table)?;

    Ok(ConsolidationStats {
        year,
        rows_before,
        rows_after: table.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PartitionTable;
    use tempfile::TempDir;

    fn event(ts: &str, uri: &str, ms: u64) -> StreamRecord {
        let mut r = StreamRecord::new(ts.parse().unwrap(), ms);
        r.track_uri = Some(uri.to_string());
        r
    }

    #[test]
    fn test_sorted_ascending() {
        let records = vec![
            event("2022-03-01T00:00:00Z", "spotify:track:c", 1),
            event("2022-01-01T00:00:00Z", "spotify:track:a", 1),
            event("2022-02-01T00:00:00Z", "spotify:track:b", 1),
        ];

        let out = consolidate_records(records, DedupKey::default());
        assert!(out.windows(2).all(|w| w[0].ts <= w[1].ts));
        assert_eq!(out[0].track_uri.as_deref(), Some("spotify:track:a"));
    }

    #[test]
    fn test_removes_non_adjacent_duplicates() {
        let records = vec![
            event("2022-01-01T00:00:00Z", "spotify:track:a", 10),
            event("2022-01-01T00:00:00Z", "spotify:track:b", 10),
            event("2022-01-01T00:00:00Z", "spotify:track:a", 10),
            event("2022-01-01T00:00:00Z", "spotify:track:a", 11),
        ];

        let out = consolidate_records(records, DedupKey::TimestampTrackDuration);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let mut enriched = event("2022-01-01T00:00:00Z", "spotify:track:a", 10);
        enriched.genres = Some("shoegaze".to_string());
        let fresh = event("2022-01-01T00:00:00Z", "spotify:track:a", 10);

        let out = consolidate_records(vec![enriched.clone(), fresh], DedupKey::ExactRow);
        assert_eq!(out, vec![enriched]);
    }

    #[test]
    fn test_exact_row_keeps_distinct_metadata() {
        let a = event("2022-01-01T00:00:00Z", "spotify:track:a", 10);
        let mut b = a.clone();
        b.platform = Some("ios".to_string());

        let by_triple =
            consolidate_records(vec![a.clone(), b.clone()], DedupKey::TimestampTrackDuration);
        assert_eq!(by_triple.len(), 1);

        let exact = consolidate_records(vec![a, b], DedupKey::ExactRow);
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn test_consolidate_partition() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());

        let mut table = PartitionTable::empty(2022);
        table.records = vec![
            event("2022-05-01T00:00:00Z", "spotify:track:b", 1),
            event("2022-01-01T00:00:00Z", "spotify:track:a", 1),
            event("2022-05-01T00:00:00Z", "spotify:track:b", 1),
        ];
        store.replace(&table).unwrap();

        let stats = consolidate_partition(&store, 2022, DedupKey::default()).unwrap();
        assert_eq!(stats.rows_before, 3);
        assert_eq!(stats.rows_after, 2);
        assert_eq!(stats.duplicates_removed(), 1);

        let loaded = store.load(2022).unwrap();
        assert_eq!(loaded.records[0].track_uri.as_deref(), Some("spotify:track:a"));
    }
}
