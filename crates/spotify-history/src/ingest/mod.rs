//! Ingestion of streaming-history exports into yearly partitions
//!
//! Each matching file is read, normalized and appended on its own; a bad file
//! is skipped and reported. Appends tolerate duplicates, and the consolidation
//! pass that follows sorts and deduplicates every partition, which is what
//! makes repeated ingestion of overlapping exports idempotent.

pub mod consolidate;
pub mod normalize;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use duckdb::Connection;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::PipelineSettings;
use crate::error::{HistoryError, Result};
use crate::progress::Reporter;
use crate::storage::{AppendedPartition, PartitionStore};

pub use consolidate::{consolidate_records, ConsolidationStats, DedupKey};
pub use normalize::{normalize_batch, normalize_value, NormalizedBatch};

/// Expand a filesystem glob (`*`, `?`, `[..]`, `**`) into matching files,
/// sorted by path. A pattern without wildcards matches itself if it exists.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let conn = Connection::open_in_memory()
        .map_err(|e| HistoryError::Database(format!("Failed to open DuckDB: {}", e)))?;

    let sql = format!(
        "SELECT file FROM glob('{}') ORDER BY file",
        pattern.replace('\'', "''")
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HistoryError::invalid_param(format!("Invalid pattern {}: {}", pattern, e)))?;

    let files = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| HistoryError::invalid_param(format!("Invalid pattern {}: {}", pattern, e)))?;

    Ok(files.into_iter().map(PathBuf::from).collect())
}

/// Per-file outcome of an ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: PathBuf,
    pub accepted: usize,
    pub rejected: usize,
}

/// A record dropped by the normalizer, with the file it came from
#[derive(Debug)]
pub struct RejectedRecord {
    pub path: PathBuf,
    pub error: HistoryError,
}

/// Outcome of a consolidation pass
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub consolidated: Vec<ConsolidationStats>,
    /// `PartitionWrite` errors of partitions left as they were
    pub failed: Vec<HistoryError>,
}

/// Everything an ingestion run did, by identity
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<FileSummary>,
    /// `FileRead` errors of files that were skipped
    pub skipped_files: Vec<HistoryError>,
    pub rejected_records: Vec<RejectedRecord>,
    pub appended: Vec<AppendedPartition>,
    /// `PartitionWrite` errors raised while appending
    pub partition_failures: Vec<HistoryError>,
    pub consolidation: ConsolidationReport,
}

impl IngestReport {
    /// Records accepted across all files
    pub fn records_accepted(&self) -> usize {
        self.files.iter().map(|f| f.accepted).sum()
    }

    /// Whether every file, record and partition went through
    pub fn is_clean(&self) -> bool {
        self.skipped_files.is_empty()
            && self.rejected_records.is_empty()
            && self.partition_failures.is_empty()
            && self.consolidation.failed.is_empty()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: usize = self.consolidation.consolidated.iter().map(|s| s.rows_after).sum();
        let duplicates: usize = self
            .consolidation
            .consolidated
            .iter()
            .map(|s| s.duplicates_removed())
            .sum();

        write!(
            f,
            "{} files, {} records accepted, {} rejected, {} files skipped; \
             {} partitions hold {} rows ({} duplicates removed)",
            self.files.len(),
            self.records_accepted(),
            self.rejected_records.len(),
            self.skipped_files.len(),
            self.consolidation.consolidated.len(),
            rows,
            duplicates
        )?;

        let failures = self.partition_failures.len() + self.consolidation.failed.len();
        if failures > 0 {
            write!(f, "; {} partition writes failed", failures)?;
        }
        Ok(())
    }
}

/// Drives load → normalize → append for every input file, then consolidates
pub struct IngestCoordinator {
    store: PartitionStore,
    dedup_key: DedupKey,
    reporter: Arc<dyn Reporter>,
}

impl IngestCoordinator {
    /// Create a coordinator writing into `store`
    pub fn new(store: PartitionStore, dedup_key: DedupKey, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            store,
            dedup_key,
            reporter,
        }
    }

    /// Create a coordinator from pipeline settings
    pub fn from_settings(settings: &PipelineSettings, reporter: Arc<dyn Reporter>) -> Self {
        Self::new(
            PartitionStore::new(&settings.output_dir),
            settings.dedup_key,
            reporter,
        )
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    /// Ingest every file matching `pattern`, then consolidate all partitions.
    ///
    /// Only an unusable pattern or an unreadable output directory fails the
    /// whole run; file, record and partition problems end up in the report.
    pub fn ingest(&self, pattern: &str) -> Result<IngestReport> {
        let files = expand_pattern(pattern)?;
        if files.is_empty() {
            warn!(pattern, "No input files match the pattern");
        }

        let mut report = IngestReport::default();
        for path in &files {
            self.ingest_file(path, &mut report);
        }
        info!(files = files.len(), "Finished processing all files");

        report.consolidation = self.consolidate_all()?;
        Ok(report)
    }

    /// Consolidate every partition present on disk.
    ///
    /// Covering all partitions (not only the ones touched by this run) also
    /// retries partitions whose consolidation failed in an earlier run.
    pub fn consolidate_all(&self) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();

        for year in self.store.list_years()? {
            match self.consolidate(year) {
                Ok(stats) => report.consolidated.push(stats),
                Err(e) => report.failed.push(e),
            }
        }

        Ok(report)
    }

    /// Consolidate a single partition
    pub fn consolidate(&self, year: i32) -> Result<ConsolidationStats> {
        match consolidate::consolidate_partition(&self.store, year, self.dedup_key) {
            Ok(stats) => {
                self.reporter
                    .partition_consolidated(year, stats.rows_before, stats.rows_after);
                Ok(stats)
            }
            Err(e) => {
                let err = match e {
                    HistoryError::NotFound(_) => e,
                    other => HistoryError::partition_write(year, other),
                };
                self.reporter.partition_failed(&err);
                Err(err)
            }
        }
    }

    fn ingest_file(&self, path: &Path, report: &mut IngestReport) {
        self.reporter.file_started(path);

        let values = match read_export(path) {
            Ok(values) => values,
            Err(e) => {
                self.reporter.file_skipped(path, &e);
                report.skipped_files.push(e);
                return;
            }
        };

        let batch = normalize_batch(&values);
        for error in batch.rejected.iter() {
            self.reporter.record_rejected(path, error);
        }

        let outcome = self.store.append_by_year(&batch.records);
        for appended in &outcome.written {
            self.reporter
                .partition_appended(appended.year, appended.rows, appended.created);
        }
        for error in &outcome.failed {
            self.reporter.partition_failed(error);
        }

        self.reporter
            .file_ingested(path, batch.records.len(), batch.rejected.len());
        report.files.push(FileSummary {
            path: path.to_path_buf(),
            accepted: batch.records.len(),
            rejected: batch.rejected.len(),
        });
        report
            .rejected_records
            .extend(batch.rejected.into_iter().map(|error| RejectedRecord {
                path: path.to_path_buf(),
                error,
            }));
        report.appended.extend(outcome.written);
        report.partition_failures.extend(outcome.failed);
    }
}

/// Load one export file as an array of raw events
fn read_export(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path).map_err(|e| HistoryError::file_read(path, e))?;

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err(HistoryError::file_read(
            path,
            "expected a JSON array of streaming events",
        )),
        Err(e) => Err(HistoryError::file_read(path, e)),
    }
}
