//! Progress reporting for the ingestion and enrichment pipelines
//!
//! Coordinators receive a [`Reporter`] at construction and tell it about every
//! file, record, partition and lookup they handle. The default
//! [`TracingReporter`] turns those events into `tracing` log lines; tests plug
//! in their own implementation to observe what happened.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::HistoryError;

/// Receiver of pipeline events. Every method defaults to doing nothing.
pub trait Reporter: Send + Sync {
    /// An input file is about to be read
    fn file_started(&self, _path: &Path) {}

    /// An input file was normalized and handed to the writer
    fn file_ingested(&self, _path: &Path, _accepted: usize, _rejected: usize) {}

    /// An input file could not be read and was skipped
    fn file_skipped(&self, _path: &Path, _error: &HistoryError) {}

    /// A record inside an input file was dropped
    fn record_rejected(&self, _path: &Path, _error: &HistoryError) {}

    /// Rows were appended to a partition
    fn partition_appended(&self, _year: i32, _rows: usize, _created: bool) {}

    /// A partition could not be written or consolidated
    fn partition_failed(&self, _error: &HistoryError) {}

    /// A partition was sorted, deduplicated and rewritten
    fn partition_consolidated(&self, _year: i32, _rows_before: usize, _rows_after: usize) {}

    /// A row received its genre annotation
    fn row_enriched(&self, _artist: &str, _track: &str, _genres: &str) {}

    /// A row could not be looked up because it has no artist
    fn row_unidentified(&self, _identity: &str) {}

    /// One catalog failed for a row; the row keeps the other catalog's tags
    fn lookup_degraded(&self, _source: &str, _artist: &str, _track: &str, _error: &HistoryError) {}

    /// Enrichment progress was flushed to disk
    fn checkpoint(&self, _year: i32, _rows_enriched: usize) {}
}

/// Reporter that logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn file_started(&self, path: &Path) {
        info!(file = %path.display(), "Processing file");
    }

    fn file_ingested(&self, path: &Path, accepted: usize, rejected: usize) {
        info!(file = %path.display(), accepted, rejected, "Successfully processed file");
    }

    fn file_skipped(&self, path: &Path, error: &HistoryError) {
        warn!(file = %path.display(), error = %error, "Skipping file");
    }

    fn record_rejected(&self, path: &Path, error: &HistoryError) {
        warn!(file = %path.display(), error = %error, "Dropping record");
    }

    fn partition_appended(&self, year: i32, rows: usize, created: bool) {
        debug!(year, rows, created, "Appended rows to partition");
    }

    fn partition_failed(&self, error: &HistoryError) {
        warn!(error = %error, "Partition will be retried on the next run");
    }

    fn partition_consolidated(&self, year: i32, rows_before: usize, rows_after: usize) {
        info!(
            year,
            rows = rows_after,
            duplicates = rows_before.saturating_sub(rows_after),
            "Consolidated partition"
        );
    }

    fn row_enriched(&self, artist: &str, track: &str, genres: &str) {
        debug!(artist, track, genres, "Processed song");
    }

    fn row_unidentified(&self, identity: &str) {
        debug!(row = identity, "No artist to look up, storing empty genres");
    }

    fn lookup_degraded(&self, source: &str, artist: &str, track: &str, error: &HistoryError) {
        warn!(source, artist, track, error = %error, "Genre lookup failed");
    }

    fn checkpoint(&self, year: i32, rows_enriched: usize) {
        info!(year, rows_enriched, "Processed {} songs, progress saved", rows_enriched);
    }
}
