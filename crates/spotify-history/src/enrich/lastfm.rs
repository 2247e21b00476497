//! Last.fm genre source
//!
//! Genres are the artist's top community tags. Last.fm reports most failures
//! as a JSON body (`{"error": 6, "message": "..."}`) rather than through the
//! HTTP status, so the body is inspected even on 200. An unknown artist
//! yields no tags.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{LastFmCredentials, PipelineSettings};
use crate::error::{HistoryError, Result};

use super::rate_limiter::RateLimiter;
use super::source::{GenreSource, TagSet};

const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com";
const SOURCE_NAME: &str = "Last.fm";

/// Tags kept per artist
pub const MAX_TAGS: usize = 10;

/// Last.fm error codes
const ERROR_INVALID_PARAMETERS: u32 = 6;
const ERROR_RATE_LIMIT_EXCEEDED: u32 = 29;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopTagsResponse {
    Error {
        error: u32,
        #[serde(default)]
        message: String,
    },
    Tags {
        toptags: TopTags,
    },
}

#[derive(Debug, Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: OneOrMany<Tag>,
}

/// Last.fm collapses single-element lists into a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Catalog B: artist top tags from the Last.fm API
pub struct LastFmSource {
    client: Client,
    endpoint: Url,
    credentials: LastFmCredentials,
    rate_limiter: RateLimiter,
}

impl LastFmSource {
    pub fn new(credentials: LastFmCredentials, settings: &PipelineSettings) -> Result<Self> {
        Self::with_base_url(credentials, settings, LASTFM_API_URL)
    }

    /// Create a source with a custom endpoint (for testing)
    #[doc(hidden)]
    pub fn with_base_url(
        credentials: LastFmCredentials,
        settings: &PipelineSettings,
        base_url: &str,
    ) -> Result<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("2.0/"))
            .map_err(|e| HistoryError::config(format!("Invalid URL {}: {}", base_url, e)))?;

        Ok(Self {
            client: Client::builder().timeout(settings.request_timeout).build()?,
            endpoint,
            credentials,
            rate_limiter: RateLimiter::new(settings.request_delay),
        })
    }
}

#[async_trait]
impl GenreSource for LastFmSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    /// Tags are artist-level; the track only identifies the row in logs
    async fn fetch_tags(&mut self, artist: &str, track: &str) -> Result<TagSet> {
        self.rate_limiter.wait().await;
        debug!(artist, track, "Requesting Last.fm top tags");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("method", "artist.gettoptags"),
                ("artist", artist),
                ("api_key", self.credentials.api_key.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| HistoryError::lookup(SOURCE_NAME, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiter.on_rate_limit();
            return Err(HistoryError::RateLimited);
        }

        let body = response
            .text()
            .await
            .map_err(|e| HistoryError::lookup(SOURCE_NAME, e))?;

        let parsed: TopTagsResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(HistoryError::lookup(
                    SOURCE_NAME,
                    format!("API error {}: {}", status, body),
                ))
            }
            Err(e) => {
                return Err(HistoryError::lookup(
                    SOURCE_NAME,
                    format!("Failed to parse JSON response: {}", e),
                ))
            }
        };

        match parsed {
            TopTagsResponse::Tags { toptags } => {
                self.rate_limiter.on_success();
                Ok(toptags
                    .tag
                    .into_vec()
                    .into_iter()
                    .take(MAX_TAGS)
                    .map(|tag| tag.name)
                    .collect())
            }
            TopTagsResponse::Error { error, .. } if error == ERROR_INVALID_PARAMETERS => {
                self.rate_limiter.on_success();
                debug!(artist, "Artist unknown to Last.fm");
                Ok(TagSet::new())
            }
            TopTagsResponse::Error { error, .. } if error == ERROR_RATE_LIMIT_EXCEEDED => {
                self.rate_limiter.on_rate_limit();
                Err(HistoryError::RateLimited)
            }
            TopTagsResponse::Error { error, message } => Err(HistoryError::lookup(
                SOURCE_NAME,
                format!("API error {}: {}", error, message),
            )),
        }
    }
}
