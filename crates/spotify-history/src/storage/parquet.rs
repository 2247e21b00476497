//! Parquet read/write for yearly streaming-history partitions
//!
//! Every write replaces the whole partition file: the new content goes to a
//! temp file next to the partition, is synced, and is then renamed over the
//! old file. Readers (including a crashed-and-restarted process) only ever see
//! a complete partition.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::models::stream::{self, StreamRecord};

use super::partitions::{self, PartitionTable};

/// Result of appending rows to one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedPartition {
    pub year: i32,
    /// Rows appended by this call
    pub rows: usize,
    /// Whether the partition file was created by this call
    pub created: bool,
}

/// Result of appending a multi-year batch
#[derive(Debug, Default)]
pub struct AppendOutcome {
    pub written: Vec<AppendedPartition>,
    /// One `PartitionWrite` error per partition that could not be written
    pub failed: Vec<HistoryError>,
}

/// Row counts for one partition, used by `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub year: i32,
    pub path: PathBuf,
    pub rows: usize,
    pub enriched: usize,
    pub has_genre_column: bool,
}

/// Parquet storage for yearly partitions
#[derive(Debug, Clone)]
pub struct PartitionStore {
    base_path: PathBuf,
}

impl PartitionStore {
    /// Create a new PartitionStore rooted at the given directory
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory holding the partition files
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the full path for a partition file
    pub fn partition_path(&self, year: i32) -> PathBuf {
        self.base_path.join(partitions::partition_file_name(year))
    }

    /// Check whether a partition has been written
    pub fn exists(&self, year: i32) -> bool {
        self.partition_path(year).is_file()
    }

    /// Years of every partition present on disk, ascending
    pub fn list_years(&self) -> Result<Vec<i32>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut years = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(year) = entry
                .file_name()
                .to_str()
                .and_then(partitions::parse_partition_file_name)
            {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    /// Load a partition, failing if it does not exist
    pub fn load(&self, year: i32) -> Result<PartitionTable> {
        let path = self.partition_path(year);
        if !path.exists() {
            return Err(HistoryError::NotFound(format!(
                "No partition for {} at {}",
                year,
                path.display()
            )));
        }
        self.read_table(&path, year)
    }

    /// Load a partition, or an empty table if it has never been written
    pub fn load_or_empty(&self, year: i32) -> Result<PartitionTable> {
        let path = self.partition_path(year);
        if !path.exists() {
            return Ok(PartitionTable::empty(year));
        }
        self.read_table(&path, year)
    }

    /// Atomically replace a partition with the given table
    pub fn replace(&self, table: &PartitionTable) -> Result<()> {
        fs::create_dir_all(&self.base_path).map_err(|e| {
            HistoryError::storage(format!(
                "Failed to create directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let batch = Self::records_to_batch(&table.records, table.has_genre_column)?;
        self.write_batch(&self.partition_path(table.year), &batch)
    }

    /// Append rows to a single year's partition.
    ///
    /// An existing partition keeps its schema (including a `genres` column if
    /// enrichment already ran); a new partition starts with the canonical
    /// columns only. No deduplication happens here.
    pub fn append(&self, year: i32, records: &[StreamRecord]) -> Result<AppendedPartition> {
        if let Some(stray) = records.iter().find(|r| r.year() != year) {
            return Err(HistoryError::invalid_param(format!(
                "Record at {} does not belong to partition {}",
                stray.ts, year
            )));
        }

        let created = !self.exists(year);
        let mut table = self.load_or_empty(year)?;
        table.records.extend_from_slice(records);
        self.replace(&table)?;

        debug!(year, rows = records.len(), created, "Appended to partition");
        Ok(AppendedPartition {
            year,
            rows: records.len(),
            created,
        })
    }

    /// Split a batch by year and append each slice to its partition.
    ///
    /// A failing partition does not stop the others.
    pub fn append_by_year(&self, records: &[StreamRecord]) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();

        for (year, rows) in partitions::split_by_year(records) {
            match self.append(year, &rows) {
                Ok(appended) => outcome.written.push(appended),
                Err(e) => outcome
                    .failed
                    .push(HistoryError::partition_write(year, e)),
            }
        }

        outcome
    }

    /// Row and enrichment counts for every partition
    pub fn summaries(&self) -> Result<Vec<PartitionSummary>> {
        self.list_years()?
            .into_iter()
            .map(|year| {
                let table = self.load(year)?;
                Ok(PartitionSummary {
                    year,
                    path: self.partition_path(year),
                    rows: table.len(),
                    enriched: table.enriched_count(),
                    has_genre_column: table.has_genre_column,
                })
            })
            .collect()
    }

    /// Write a record batch to a partition file atomically
    fn write_batch(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        // Write to temp file first
        let temp_path = path.with_extension("parquet.tmp");

        let file = File::create(&temp_path)
            .map_err(|e| HistoryError::storage(format!("Failed to create temp file: {}", e)))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| HistoryError::storage(format!("Failed to create Parquet writer: {}", e)))?;

        writer
            .write(batch)
            .map_err(|e| HistoryError::storage(format!("Failed to write batch: {}", e)))?;

        writer
            .close()
            .map_err(|e| HistoryError::storage(format!("Failed to close writer: {}", e)))?;

        File::open(&temp_path)
            .and_then(|f| f.sync_all())
            .map_err(|e| HistoryError::storage(format!("Failed to sync temp file: {}", e)))?;

        // Atomic rename
        fs::rename(&temp_path, path)
            .map_err(|e| HistoryError::storage(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    /// Read a partition file into memory
    fn read_table(&self, path: &Path, year: i32) -> Result<PartitionTable> {
        let (schema, batches) = self.read_batches(path)?;
        let has_genre_column = schema.field_with_name(stream::GENRES).is_ok();

        let mut records = Vec::new();
        for batch in &batches {
            records.extend(Self::batch_to_records(batch)?);
        }

        Ok(PartitionTable {
            year,
            records,
            has_genre_column,
        })
    }

    /// Read all record batches from a partition file
    fn read_batches(&self, path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let file = File::open(path)
            .map_err(|e| HistoryError::storage(format!("Failed to open file: {}", e)))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| HistoryError::storage(format!("Failed to create reader: {}", e)))?;
        let schema = builder.schema().clone();

        let reader = builder
            .build()
            .map_err(|e| HistoryError::storage(format!("Failed to build reader: {}", e)))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| HistoryError::storage(format!("Failed to read batches: {}", e)))?;

        Ok((schema, batches))
    }

    /// Arrow schema of a partition, with or without the genre column
    pub fn schema(with_genres: bool) -> SchemaRef {
        let mut fields = vec![
            Field::new(
                stream::TS,
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new(stream::PLATFORM, DataType::Utf8, true),
            Field::new(stream::MS_PLAYED, DataType::Int64, false),
            Field::new(stream::CONN_COUNTRY, DataType::Utf8, true),
            Field::new(stream::TRACK_NAME, DataType::Utf8, true),
            Field::new(stream::ARTIST_NAME, DataType::Utf8, true),
            Field::new(stream::ALBUM_NAME, DataType::Utf8, true),
            Field::new(stream::TRACK_URI, DataType::Utf8, true),
            Field::new(stream::REASON_START, DataType::Utf8, true),
            Field::new(stream::REASON_END, DataType::Utf8, true),
            Field::new(stream::SHUFFLE, DataType::Boolean, true),
            Field::new(stream::SKIPPED, DataType::Boolean, true),
            Field::new(stream::OFFLINE, DataType::Boolean, true),
            Field::new(stream::OFFLINE_TIMESTAMP, DataType::Int64, true),
        ];
        if with_genres {
            fields.push(Field::new(stream::GENRES, DataType::Utf8, true));
        }
        Arc::new(Schema::new(fields))
    }

    fn records_to_batch(records: &[StreamRecord], with_genres: bool) -> Result<RecordBatch> {
        let ts: TimestampMicrosecondArray = records
            .iter()
            .map(|r| Some(r.ts.timestamp_micros()))
            .collect();
        let platform: StringArray = records.iter().map(|r| r.platform.as_deref()).collect();
        let ms_played: Int64Array = records
            .iter()
            .map(|r| {
                i64::try_from(r.ms_played).map(Some).map_err(|_| {
                    HistoryError::storage(format!("ms_played out of range: {}", r.ms_played))
                })
            })
            .collect::<Result<_>>()?;
        let conn_country: StringArray = records.iter().map(|r| r.conn_country.as_deref()).collect();
        let track_name: StringArray = records.iter().map(|r| r.track_name.as_deref()).collect();
        let artist_name: StringArray = records.iter().map(|r| r.artist_name.as_deref()).collect();
        let album_name: StringArray = records.iter().map(|r| r.album_name.as_deref()).collect();
        let track_uri: StringArray = records.iter().map(|r| r.track_uri.as_deref()).collect();
        let reason_start: StringArray = records.iter().map(|r| r.reason_start.as_deref()).collect();
        let reason_end: StringArray = records.iter().map(|r| r.reason_end.as_deref()).collect();
        let shuffle: BooleanArray = records.iter().map(|r| r.shuffle).collect();
        let skipped: BooleanArray = records.iter().map(|r| r.skipped).collect();
        let offline: BooleanArray = records.iter().map(|r| r.offline).collect();
        let offline_timestamp: Int64Array = records.iter().map(|r| r.offline_timestamp).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(ts),
            Arc::new(platform),
            Arc::new(ms_played),
            Arc::new(conn_country),
            Arc::new(track_name),
            Arc::new(artist_name),
            Arc::new(album_name),
            Arc::new(track_uri),
            Arc::new(reason_start),
            Arc::new(reason_end),
            Arc::new(shuffle),
            Arc::new(skipped),
            Arc::new(offline),
            Arc::new(offline_timestamp),
        ];
        if with_genres {
            let genres: StringArray = records.iter().map(|r| r.genres.as_deref()).collect();
            columns.push(Arc::new(genres));
        }

        RecordBatch::try_new(Self::schema(with_genres), columns)
            .map_err(|e| HistoryError::storage(format!("Failed to create record batch: {}", e)))
    }

    fn batch_to_records(batch: &RecordBatch) -> Result<Vec<StreamRecord>> {
        let len = batch.num_rows();
        let mut records = Vec::with_capacity(len);

        let ts = column::<TimestampMicrosecondArray>(batch, stream::TS)?;
        let platform = column::<StringArray>(batch, stream::PLATFORM)?;
        let ms_played = column::<Int64Array>(batch, stream::MS_PLAYED)?;
        let conn_country = column::<StringArray>(batch, stream::CONN_COUNTRY)?;
        let track_name = column::<StringArray>(batch, stream::TRACK_NAME)?;
        let artist_name = column::<StringArray>(batch, stream::ARTIST_NAME)?;
        let album_name = column::<StringArray>(batch, stream::ALBUM_NAME)?;
        let track_uri = column::<StringArray>(batch, stream::TRACK_URI)?;
        let reason_start = column::<StringArray>(batch, stream::REASON_START)?;
        let reason_end = column::<StringArray>(batch, stream::REASON_END)?;
        let shuffle = column::<BooleanArray>(batch, stream::SHUFFLE)?;
        let skipped = column::<BooleanArray>(batch, stream::SKIPPED)?;
        let offline = column::<BooleanArray>(batch, stream::OFFLINE)?;
        let offline_timestamp = column::<Int64Array>(batch, stream::OFFLINE_TIMESTAMP)?;
        let genres = match batch.column_by_name(stream::GENRES) {
            Some(_) => Some(column::<StringArray>(batch, stream::GENRES)?),
            None => None,
        };

        for i in 0..len {
            let micros = ts.value(i);
            let ts = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                HistoryError::storage(format!("Timestamp out of range: {}", micros))
            })?;
            let ms = u64::try_from(ms_played.value(i)).map_err(|_| {
                HistoryError::storage(format!("Negative ms_played: {}", ms_played.value(i)))
            })?;

            records.push(StreamRecord {
                ts,
                platform: string_at(platform, i),
                ms_played: ms,
                conn_country: string_at(conn_country, i),
                track_name: string_at(track_name, i),
                artist_name: string_at(artist_name, i),
                album_name: string_at(album_name, i),
                track_uri: string_at(track_uri, i),
                reason_start: string_at(reason_start, i),
                reason_end: string_at(reason_end, i),
                shuffle: shuffle.is_valid(i).then(|| shuffle.value(i)),
                skipped: skipped.is_valid(i).then(|| skipped.value(i)),
                offline: offline.is_valid(i).then(|| offline.value(i)),
                offline_timestamp: offline_timestamp
                    .is_valid(i)
                    .then(|| offline_timestamp.value(i)),
                genres: genres.and_then(|g| string_at(g, i)),
            });
        }

        Ok(records)
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            HistoryError::storage(format!(
                "Partition column {} is missing or has an unexpected type",
                name
            ))
        })
}

fn string_at(array: &StringArray, i: usize) -> Option<String> {
    array.is_valid(i).then(|| array.value(i).to_string())
}
