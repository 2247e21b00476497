//! Listening event model for Spotify streaming-history exports
//!
//! One [`StreamRecord`] is one row of a yearly partition. Field names follow the
//! columns of the "extended streaming history" export so that external readers
//! (DuckDB, pandas) see the same names they would in the raw JSON.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of the event (UTC instant)
pub const TS: &str = "ts";
pub const PLATFORM: &str = "platform";
pub const MS_PLAYED: &str = "ms_played";
pub const CONN_COUNTRY: &str = "conn_country";
pub const TRACK_NAME: &str = "master_metadata_track_name";
pub const ARTIST_NAME: &str = "master_metadata_album_artist_name";
pub const ALBUM_NAME: &str = "master_metadata_album_album_name";
pub const TRACK_URI: &str = "spotify_track_uri";
pub const REASON_START: &str = "reason_start";
pub const REASON_END: &str = "reason_end";
pub const SHUFFLE: &str = "shuffle";
pub const SKIPPED: &str = "skipped";
pub const OFFLINE: &str = "offline";
pub const OFFLINE_TIMESTAMP: &str = "offline_timestamp";
/// Genre column appended by enrichment
pub const GENRES: &str = "genres";

/// The recognized export columns, in partition order
pub const CANONICAL_COLUMNS: [&str; 14] = [
    TS,
    PLATFORM,
    MS_PLAYED,
    CONN_COUNTRY,
    TRACK_NAME,
    ARTIST_NAME,
    ALBUM_NAME,
    TRACK_URI,
    REASON_START,
    REASON_END,
    SHUFFLE,
    SKIPPED,
    OFFLINE,
    OFFLINE_TIMESTAMP,
];

/// A single listening event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRecord {
    pub ts: DateTime<Utc>,
    pub platform: Option<String>,
    pub ms_played: u64,
    pub conn_country: Option<String>,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub track_uri: Option<String>,
    pub reason_start: Option<String>,
    pub reason_end: Option<String>,
    pub shuffle: Option<bool>,
    pub skipped: Option<bool>,
    pub offline: Option<bool>,
    pub offline_timestamp: Option<i64>,
    /// `None` until enrichment has processed the row; `Some("")` when it found no tags
    pub genres: Option<String>,
}

impl StreamRecord {
    /// Create a record with only the mandatory fields set
    pub fn new(ts: DateTime<Utc>, ms_played: u64) -> Self {
        Self {
            ts,
            platform: None,
            ms_played,
            conn_country: None,
            track_name: None,
            artist_name: None,
            album_name: None,
            track_uri: None,
            reason_start: None,
            reason_end: None,
            shuffle: None,
            skipped: None,
            offline: None,
            offline_timestamp: None,
            genres: None,
        }
    }

    /// Calendar year (UTC) that owns this record
    pub fn year(&self) -> i32 {
        self.ts.year()
    }

    /// Whether enrichment has already processed this row
    pub fn is_enriched(&self) -> bool {
        self.genres.is_some()
    }

    /// Human readable identity used in diagnostics ("artist - track")
    pub fn identity(&self) -> String {
        format!(
            "{} - {}",
            self.artist_name.as_deref().unwrap_or("<unknown artist>"),
            self.track_name.as_deref().unwrap_or("<unknown track>")
        )
    }

    /// Copy of the record without the enrichment annotation
    pub fn without_genres(&self) -> Self {
        Self {
            genres: None,
            ..self.clone()
        }
    }
}
