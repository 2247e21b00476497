//! Genre catalog abstraction

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::{HistoryError, Result};

/// Genre tags returned by a catalog, sorted and unique
pub type TagSet = BTreeSet<String>;

/// Outcome of a fail-soft lookup
#[derive(Debug, Default)]
pub struct TagLookup {
    /// Tags found; empty when the lookup failed
    pub tags: TagSet,
    /// Why the lookup failed, if it did
    pub error: Option<HistoryError>,
}

impl TagLookup {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A rate-limited external catalog that knows genres for an artist/track
#[async_trait]
pub trait GenreSource: Send {
    /// Display name used in logs and reports
    fn name(&self) -> &'static str;

    /// Look up tags, surfacing every failure (not found, bad payload,
    /// transport error, timeout, rate limit)
    async fn fetch_tags(&mut self, artist: &str, track: &str) -> Result<TagSet>;

    /// Look up tags without ever failing: errors become an empty set
    async fn lookup_tags(&mut self, artist: &str, track: &str) -> TagLookup {
        match self.fetch_tags(artist, track).await {
            Ok(tags) => TagLookup { tags, error: None },
            Err(error) => TagLookup {
                tags: TagSet::new(),
                error: Some(error),
            },
        }
    }
}

/// Canonical form of a tag: trimmed and lowercased, `None` if blank.
///
/// Commas are replaced because the stored genre field is comma-joined.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().replace(',', " ").to_lowercase();
    (!tag.is_empty()).then_some(tag)
}

/// Join tags into the stored genre field
pub fn join_tags(tags: &TagSet) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
