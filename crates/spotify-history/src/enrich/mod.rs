//! Genre enrichment of a yearly partition
//!
//! Every row whose `genres` is still null is looked up in each configured
//! catalog, and the union of their tags is stored as a comma-joined string.
//! Progress is flushed to disk every few rows, so an interrupted run resumes
//! where the last checkpoint left off: rows already carrying a value (even an
//! empty one) are never looked up again.

pub mod lastfm;
pub mod rate_limiter;
pub mod source;
pub mod spotify;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{CatalogCredentials, PipelineSettings, DEFAULT_CHECKPOINT_EVERY};
use crate::error::{HistoryError, Result};
use crate::progress::Reporter;
use crate::storage::{PartitionStore, PartitionTable};

pub use lastfm::LastFmSource;
pub use rate_limiter::RateLimiter;
pub use source::{join_tags, normalize_tag, GenreSource, TagLookup, TagSet};
pub use spotify::SpotifySource;

/// How an enrichment run proceeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    /// Flush the partition after this many newly enriched rows
    pub checkpoint_every: usize,
    /// Stop after enriching this many rows; the rest waits for the next run
    pub limit: Option<usize>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            limit: None,
        }
    }
}

/// A catalog that failed for one row
#[derive(Debug)]
pub struct DegradedLookup {
    pub source: &'static str,
    pub artist: String,
    pub track: String,
    pub error: HistoryError,
}

/// What an enrichment run did
#[derive(Debug, Default)]
pub struct EnrichReport {
    pub year: i32,
    pub total_rows: usize,
    /// Rows that already had a genre value and were skipped
    pub already_enriched: usize,
    /// Rows that received tags (possibly none) in this run
    pub enriched: usize,
    /// Rows answered from the per-run memo without catalog calls
    pub memo_hits: usize,
    /// Rows without an artist, stored as "" and identified here
    pub unidentified: Vec<String>,
    pub degraded: Vec<DegradedLookup>,
    pub checkpoints: usize,
    /// Rows still null because the run limit was reached
    pub remaining: usize,
}

impl EnrichReport {
    /// Rows that got a genre value in this run
    pub fn rows_written(&self) -> usize {
        self.enriched + self.unidentified.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

impl fmt::Display for EnrichReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows, {} already enriched, {} enriched ({} from memo), {} without artist, {} degraded lookups, {} checkpoints",
            self.year,
            self.total_rows,
            self.already_enriched,
            self.enriched,
            self.memo_hits,
            self.unidentified.len(),
            self.degraded.len(),
            self.checkpoints
        )?;
        if self.remaining > 0 {
            write!(f, "; {} rows left for the next run", self.remaining)?;
        }
        Ok(())
    }
}

/// Drives genre lookups over a partition with periodic checkpoints
pub struct EnrichCoordinator {
    store: PartitionStore,
    sources: Vec<Box<dyn GenreSource>>,
    options: EnrichOptions,
    reporter: Arc<dyn Reporter>,
}

impl EnrichCoordinator {
    pub fn new(
        store: PartitionStore,
        sources: Vec<Box<dyn GenreSource>>,
        options: EnrichOptions,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            sources,
            options,
            reporter,
        }
    }

    /// Coordinator backed by the Spotify and Last.fm catalogs
    pub fn from_settings(
        settings: &PipelineSettings,
        credentials: CatalogCredentials,
        limit: Option<usize>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        settings.validate()?;

        let sources: Vec<Box<dyn GenreSource>> = vec![
            Box::new(SpotifySource::new(credentials.spotify, settings)?),
            Box::new(LastFmSource::new(credentials.lastfm, settings)?),
        ];

        Ok(Self::new(
            PartitionStore::new(&settings.output_dir),
            sources,
            EnrichOptions {
                checkpoint_every: settings.checkpoint_every,
                limit,
            },
            reporter,
        ))
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    /// Enrich the partition of `year` on disk, checkpointing into it
    pub async fn enrich(&mut self, year: i32) -> Result<EnrichReport> {
        let mut table = self.store.load(year)?;
        let store = self.store.clone();
        self.enrich_table(&mut table, |table| store.replace(table)).await
    }

    /// Enrich an in-memory partition, handing it to `flush` at every checkpoint.
    ///
    /// A flush failure stops the run with `CheckpointFlush`; lookup failures
    /// only degrade the row they happened on.
    pub async fn enrich_table<F>(
        &mut self,
        table: &mut PartitionTable,
        mut flush: F,
    ) -> Result<EnrichReport>
    where
        F: FnMut(&PartitionTable) -> Result<()>,
    {
        let year = table.year;
        let checkpoint_every = self.options.checkpoint_every.max(1);
        let column_added = !table.has_genre_column;
        table.has_genre_column = true;

        let mut report = EnrichReport {
            year,
            total_rows: table.len(),
            ..EnrichReport::default()
        };
        // Memo covers this run only: stored rows may come from degraded lookups
        let mut memo: HashMap<(String, String), String> = HashMap::new();
        let mut pending = 0;

        for index in 0..table.records.len() {
            if table.records[index].genres.is_some() {
                report.already_enriched += 1;
                continue;
            }
            if self
                .options
                .limit
                .is_some_and(|limit| report.rows_written() >= limit)
            {
                report.remaining += 1;
                continue;
            }

            let record = &table.records[index];
            let artist = record
                .artist_name
                .as_deref()
                .map(str::trim)
                .filter(|artist| !artist.is_empty())
                .map(str::to_string);

            let genres = match artist {
                None => {
                    let identity = record.identity();
                    self.reporter.row_unidentified(&identity);
                    report.unidentified.push(identity);
                    String::new()
                }
                Some(artist) => {
                    let track = record.track_name.clone().unwrap_or_default();
                    let key = (artist, track);
                    let genres = match memo.get(&key) {
                        Some(genres) => {
                            report.memo_hits += 1;
                            genres.clone()
                        }
                        None => {
                            let (tags, degraded) =
                                self.lookup_all(&key.0, &key.1, &mut report).await;
                            let genres = join_tags(&tags);
                            if !degraded {
                                memo.insert(key.clone(), genres.clone());
                            }
                            genres
                        }
                    };
                    self.reporter.row_enriched(&key.0, &key.1, &genres);
                    report.enriched += 1;
                    genres
                }
            };

            table.records[index].genres = Some(genres);
            pending += 1;

            if pending >= checkpoint_every {
                self.checkpoint(table, &mut flush, &mut report)?;
                pending = 0;
            }
        }

        if pending > 0 || column_added {
            self.checkpoint(table, &mut flush, &mut report)?;
        }

        info!(%report, "Completed processing");
        Ok(report)
    }

    /// Ask every catalog, returning the tag union and whether any catalog failed
    async fn lookup_all(
        &mut self,
        artist: &str,
        track: &str,
        report: &mut EnrichReport,
    ) -> (TagSet, bool) {
        let mut tags = TagSet::new();
        let mut degraded = false;

        for source in self.sources.iter_mut() {
            let lookup = source.lookup_tags(artist, track).await;
            if let Some(error) = lookup.error {
                self.reporter
                    .lookup_degraded(source.name(), artist, track, &error);
                report.degraded.push(DegradedLookup {
                    source: source.name(),
                    artist: artist.to_string(),
                    track: track.to_string(),
                    error,
                });
                degraded = true;
            }
            tags.extend(lookup.tags.iter().filter_map(|tag| normalize_tag(tag)));
        }

        (tags, degraded)
    }

    fn checkpoint<F>(
        &self,
        table: &PartitionTable,
        flush: &mut F,
        report: &mut EnrichReport,
    ) -> Result<()>
    where
        F: FnMut(&PartitionTable) -> Result<()>,
    {
        flush(table).map_err(|e| HistoryError::CheckpointFlush {
            year: table.year,
            reason: e.to_string(),
        })?;
        report.checkpoints += 1;
        self.reporter.checkpoint(table.year, report.rows_written());
        Ok(())
    }
}
