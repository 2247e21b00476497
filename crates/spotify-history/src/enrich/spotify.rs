//! Spotify Web API genre source
//!
//! Spotify has no genres on tracks, so a lookup is search-then-detail: find
//! the track, take its first artist, and read that artist's genres. Access
//! uses the client-credentials flow; the token is cached until shortly before
//! it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::{PipelineSettings, SpotifyCredentials};
use crate::error::{HistoryError, Result};

use super::rate_limiter::RateLimiter;
use super::source::{GenreSource, TagSet};

const SPOTIFY_API_URL: &str = "https://api.spotify.com";
const SPOTIFY_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const SOURCE_NAME: &str = "Spotify";

/// Refresh the token this long before Spotify says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistResponse {
    #[serde(default)]
    genres: Vec<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Catalog A: artist genres from the Spotify Web API
pub struct SpotifySource {
    client: Client,
    api_base: Url,
    accounts_base: Url,
    credentials: SpotifyCredentials,
    token: Option<AccessToken>,
    rate_limiter: RateLimiter,
}

impl SpotifySource {
    /// Create a source talking to the public Spotify endpoints
    pub fn new(credentials: SpotifyCredentials, settings: &PipelineSettings) -> Result<Self> {
        Self::with_base_urls(credentials, settings, SPOTIFY_API_URL, SPOTIFY_ACCOUNTS_URL)
    }

    /// Create a source with custom endpoints (for testing)
    #[doc(hidden)]
    pub fn with_base_urls(
        credentials: SpotifyCredentials,
        settings: &PipelineSettings,
        api_base: &str,
        accounts_base: &str,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(settings.request_timeout).build()?,
            api_base: parse_base(api_base)?,
            accounts_base: parse_base(accounts_base)?,
            credentials,
            token: None,
            rate_limiter: RateLimiter::new(settings.request_delay),
        })
    }

    /// Send a request after waiting for the rate limiter, mapping error statuses
    async fn send(&mut self, request: RequestBuilder) -> Result<Response> {
        self.rate_limiter.wait().await;

        let response = request
            .send()
            .await
            .map_err(|e| HistoryError::lookup(SOURCE_NAME, e))?;

        match response.status() {
            status if status.is_success() => {
                self.rate_limiter.on_success();
                Ok(response)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.rate_limiter.on_rate_limit();
                Err(HistoryError::RateLimited)
            }
            StatusCode::UNAUTHORIZED => {
                self.token = None;
                Err(HistoryError::lookup(SOURCE_NAME, "access token rejected"))
            }
            StatusCode::NOT_FOUND => Err(HistoryError::NotFound(format!(
                "{} resource {}",
                SOURCE_NAME,
                response.url().path()
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(HistoryError::lookup(
                    SOURCE_NAME,
                    format!("API error {}: {}", status, body),
                ))
            }
        }
    }

    /// Current bearer token, fetching a new one when missing or stale
    async fn access_token(&mut self) -> Result<String> {
        if let Some(token) = &self.token {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let url = join(&self.accounts_base, "api/token")?;
        let request = self
            .client
            .post(url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")]);

        let response = self.send(request).await?;
        let body: TokenResponse = read_json(response).await?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        self.token = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }
}

#[async_trait]
impl GenreSource for SpotifySource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch_tags(&mut self, artist: &str, track: &str) -> Result<TagSet> {
        let token = self.access_token().await?;

        let query = search_query(artist, track);
        let request = self
            .client
            .get(join(&self.api_base, "v1/search")?)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")]);
        let search: SearchResponse = read_json(self.send(request).await?).await?;

        let artist_id = search
            .tracks
            .items
            .into_iter()
            .next()
            .and_then(|track| track.artists.into_iter().next())
            .and_then(|artist| artist.id);
        let Some(artist_id) = artist_id else {
            return Ok(TagSet::new());
        };

        let request = self
            .client
            .get(join(&self.api_base, &format!("v1/artists/{}", artist_id))?)
            .bearer_auth(&token);
        let artist: ArtistResponse = read_json(self.send(request).await?).await?;

        Ok(artist.genres.into_iter().collect())
    }
}

/// Field-filtered search query for one track
fn search_query(artist: &str, track: &str) -> String {
    if track.trim().is_empty() {
        format!("artist:{}", artist)
    } else {
        format!("track:{} artist:{}", track, artist)
    }
}

fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| HistoryError::config(format!("Invalid URL {}: {}", base, e)))
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| HistoryError::lookup(SOURCE_NAME, format!("Invalid URL path {}: {}", path, e)))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json().await.map_err(|e| {
        HistoryError::lookup(SOURCE_NAME, format!("Failed to parse JSON response: {}", e))
    })
}
