mod credentials;

pub use credentials::{CatalogCredentials, LastFmCredentials, SpotifyCredentials};

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HistoryError, Result};
use crate::ingest::DedupKey;

/// Default data directory name
const DATA_DIR_NAME: &str = "spotify-history";

/// Rows enriched between two checkpoint flushes
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;

/// Minimum delay between two calls to the same catalog
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(250);

/// Upper bound for a single catalog request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Get the data directory path
/// Returns ~/.local/share/spotify-history on Unix,
/// ~/Library/Application Support/spotify-history on macOS
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|p| p.join(DATA_DIR_NAME))
        .ok_or_else(|| HistoryError::config("Could not determine data directory"))
}

/// Knobs shared by the ingestion and enrichment pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Directory holding the yearly partitions
    pub output_dir: PathBuf,
    /// Flush the partition after this many newly enriched rows
    pub checkpoint_every: usize,
    /// Minimum delay between two calls to the same catalog
    pub request_delay: Duration,
    /// Timeout applied to every catalog request
    pub request_timeout: Duration,
    /// Which columns identify a duplicate event during consolidation
    pub dedup_key: DedupKey,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_dir: crate::storage::default_storage_path(),
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            request_delay: DEFAULT_REQUEST_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            dedup_key: DedupKey::default(),
        }
    }
}

impl PipelineSettings {
    /// Settings with a custom partition directory and defaults otherwise
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_every == 0 {
            return Err(HistoryError::invalid_param(
                "checkpoint interval must be at least 1 row",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(HistoryError::invalid_param(
                "request timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}
