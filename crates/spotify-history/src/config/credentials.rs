use crate::error::{HistoryError, Result};

pub const SPOTIFY_CLIENT_ID_VAR: &str = "SPOTIFY_CLIENT_ID";
pub const SPOTIFY_CLIENT_SECRET_VAR: &str = "SPOTIFY_CLIENT_SECRET";
pub const LASTFM_API_KEY_VAR: &str = "LASTFM_API_KEY";
pub const LASTFM_API_SECRET_VAR: &str = "LASTFM_API_SECRET";

/// Spotify Web API client-credentials pair
#[derive(Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Last.fm API account
#[derive(Clone, PartialEq, Eq)]
pub struct LastFmCredentials {
    pub api_key: String,
    /// Only needed for signed (write) calls; read-only lookups send the key alone
    pub api_secret: String,
}

/// Secrets for both genre catalogs.
///
/// All four values must be present before enrichment starts; a missing one is
/// a setup error, reported before any partition is touched.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogCredentials {
    pub spotify: SpotifyCredentials,
    pub lastfm: LastFmCredentials,
}

impl CatalogCredentials {
    /// Build credentials from optional values, naming every missing one
    pub fn new(
        spotify_client_id: Option<String>,
        spotify_client_secret: Option<String>,
        lastfm_api_key: Option<String>,
        lastfm_api_secret: Option<String>,
    ) -> Result<Self> {
        let values = [
            (SPOTIFY_CLIENT_ID_VAR, spotify_client_id),
            (SPOTIFY_CLIENT_SECRET_VAR, spotify_client_secret),
            (LASTFM_API_KEY_VAR, lastfm_api_key),
            (LASTFM_API_SECRET_VAR, lastfm_api_secret),
        ];

        let missing: Vec<&str> = values
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(HistoryError::config(format!(
                "Missing API credentials: {}",
                missing.join(", ")
            )));
        }

        let [client_id, client_secret, api_key, api_secret] =
            values.map(|(_, value)| value.unwrap_or_default().trim().to_string());

        Ok(Self {
            spotify: SpotifyCredentials {
                client_id,
                client_secret,
            },
            lastfm: LastFmCredentials {
                api_key,
                api_secret,
            },
        })
    }
}

// Secrets never end up in logs or panic messages
impl std::fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCredentials")
            .field("spotify_client_id", &self.spotify.client_id)
            .field("spotify_client_secret", &"***")
            .field("lastfm_api_key", &"***")
            .field("lastfm_api_secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_all_present() {
        let creds = CatalogCredentials::new(some("id"), some("secret"), some("key"), some(" lfm "))
            .unwrap();
        assert_eq!(creds.spotify.client_id, "id");
        assert_eq!(creds.spotify.client_secret, "secret");
        assert_eq!(creds.lastfm.api_key, "key");
        assert_eq!(creds.lastfm.api_secret, "lfm");
    }

    #[test]
    fn test_missing_values_are_listed() {
        let err = CatalogCredentials::new(some("id"), None, some("  "), some("lfm")).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, HistoryError::Config(_)));
        assert!(msg.contains(SPOTIFY_CLIENT_SECRET_VAR));
        assert!(msg.contains(LASTFM_API_KEY_VAR));
        assert!(!msg.contains(SPOTIFY_CLIENT_ID_VAR));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds =
            CatalogCredentials::new(some("id"), some("hunter2"), some("key"), some("lfm")).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("id"));
    }
}
