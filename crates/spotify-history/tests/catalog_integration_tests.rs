//! Integration tests for the genre catalog clients
//!
//! These tests use wiremock to stand in for the Spotify and Last.fm APIs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use spotify_history::config::{LastFmCredentials, PipelineSettings, SpotifyCredentials};
use spotify_history::enrich::{
    EnrichCoordinator, EnrichOptions, GenreSource, LastFmSource, SpotifySource, TagSet,
};
use spotify_history::models::StreamRecord;
use spotify_history::progress::TracingReporter;
use spotify_history::storage::{PartitionStore, PartitionTable};
use spotify_history::HistoryError;
use wiremock::matchers::{
    body_string_contains, header, header_exists, method, path, path_regex, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_settings() -> PipelineSettings {
    PipelineSettings {
        request_delay: Duration::ZERO,
        ..PipelineSettings::with_output_dir("unused")
    }
}

fn spotify_source(server: &MockServer) -> SpotifySource {
    let credentials = SpotifyCredentials {
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
    };
    SpotifySource::with_base_urls(credentials, &test_settings(), &server.uri(), &server.uri())
        .expect("Failed to create Spotify source")
}

fn lastfm_source(server: &MockServer) -> LastFmSource {
    let credentials = LastFmCredentials {
        api_key: "test-api-key".to_string(),
        api_secret: "test-api-secret".to_string(),
    };
    LastFmSource::with_base_url(credentials, &test_settings(), &server.uri())
        .expect("Failed to create Last.fm source")
}

fn tags(values: &[&str]) -> TagSet {
    values.iter().map(|v| v.to_string()).collect()
}

async fn mount_spotify_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/spotify_token.json")),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_spotify_wolf_alice(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("q", "track:Bros artist:Wolf Alice"))
        .and(query_param("type", "track"))
        .and(query_param("limit", "1"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/spotify_search_bros.json")),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/artists/3btzEQD6sugImIHPMRgkwV"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/spotify_artist_wolf_alice.json")),
        )
        .mount(server)
        .await;
}

async fn mount_lastfm_wolf_alice(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/2.0/"))
        .and(query_param("method", "artist.gettoptags"))
        .and(query_param("artist", "Wolf Alice"))
        .and(query_param("api_key", "test-api-key"))
        .and(query_param("format", "json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/lastfm_toptags_wolf_alice.json")),
        )
        .mount(server)
        .await;
}

mod spotify_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_then_artist_genres() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;
        mount_spotify_wolf_alice(&server).await;

        let mut source = spotify_source(&server);
        let first = source
            .fetch_tags("Wolf Alice", "Bros")
            .await
            .expect("Failed to fetch genres");
        let second = source
            .fetch_tags("Wolf Alice", "Bros")
            .await
            .expect("Failed to fetch genres");

        assert_eq!(first, tags(&["pop", "rock"]));
        assert_eq!(second, first);
        // Token mock expects exactly one call: the token is cached
    }

    #[tokio::test]
    async fn test_no_search_hit_is_empty() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/spotify_search_empty.json")),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/artists/.*$"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut source = spotify_source(&server);
        let result = source.fetch_tags("Nobody", "Nothing").await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_search() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .mount(&server)
            .await;

        let mut source = spotify_source(&server);
        let result = source.fetch_tags("Wolf Alice", "Bros").await;
        assert!(matches!(result, Err(HistoryError::RateLimited)));
    }

    #[tokio::test]
    async fn test_server_error_fails_soft() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let mut source = spotify_source(&server);
        let lookup = source.lookup_tags("Wolf Alice", "Bros").await;

        assert!(lookup.tags.is_empty());
        assert!(matches!(
            lookup.error,
            Some(HistoryError::Lookup {
                source_name: "Spotify",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":"invalid_client","error_description":"Invalid client"}"#,
            ))
            .mount(&server)
            .await;

        let mut source = spotify_source(&server);
        let result = source.fetch_tags("Wolf Alice", "Bros").await;
        assert!(matches!(result, Err(HistoryError::Lookup { .. })));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/spotify_search_bros.json"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let credentials = SpotifyCredentials {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
        };
        let settings = PipelineSettings {
            request_timeout: Duration::from_millis(200),
            ..test_settings()
        };
        let mut source =
            SpotifySource::with_base_urls(credentials, &settings, &server.uri(), &server.uri())
                .unwrap();

        let lookup = source.lookup_tags("Wolf Alice", "Bros").await;
        assert!(lookup.tags.is_empty());
        assert!(lookup.is_degraded());
    }
}

mod lastfm_tests {
    use super::*;

    #[tokio::test]
    async fn test_top_tags() {
        let server = MockServer::start().await;
        mount_lastfm_wolf_alice(&server).await;

        let mut source = lastfm_source(&server);
        let result = source.fetch_tags("Wolf Alice", "Bros").await.unwrap();

        assert_eq!(result, tags(&["Rock", "indie"]));
    }

    #[tokio::test]
    async fn test_top_tags_limited_to_ten() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/"))
            .and(query_param("artist", "Massive Attack"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/lastfm_toptags_many.json")),
            )
            .mount(&server)
            .await;

        let mut source = lastfm_source(&server);
        let result = source.fetch_tags("Massive Attack", "Teardrop").await.unwrap();

        assert_eq!(result.len(), 10);
        assert!(result.contains("trip-hop"));
        assert!(!result.contains("seen live"));
    }

    #[tokio::test]
    async fn test_unknown_artist_has_no_tags() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/lastfm_error_not_found.json")),
            )
            .mount(&server)
            .await;

        let mut source = lastfm_source(&server);
        let lookup = source.lookup_tags("Nobody", "Nothing").await;
        assert!(lookup.tags.is_empty());
        assert!(!lookup.is_degraded());
    }

    #[tokio::test]
    async fn test_rate_limit_error_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/lastfm_error_rate_limit.json")),
            )
            .mount(&server)
            .await;

        let mut source = lastfm_source(&server);
        let result = source.fetch_tags("Wolf Alice", "Bros").await;
        assert!(matches!(result, Err(HistoryError::RateLimited)));
    }

    #[tokio::test]
    async fn test_malformed_body_fails_soft() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let mut source = lastfm_source(&server);
        let lookup = source.lookup_tags("Wolf Alice", "Bros").await;
        assert!(lookup.tags.is_empty());
        assert!(matches!(lookup.error, Some(HistoryError::Lookup { .. })));
    }
}

mod coordinator_tests {
    use super::*;

    #[tokio::test]
    async fn test_union_of_both_catalogs() {
        let spotify = MockServer::start().await;
        mount_spotify_token(&spotify, 1).await;
        mount_spotify_wolf_alice(&spotify).await;

        let lastfm = MockServer::start().await;
        mount_lastfm_wolf_alice(&lastfm).await;

        let sources: Vec<Box<dyn GenreSource>> = vec![
            Box::new(spotify_source(&spotify)),
            Box::new(lastfm_source(&lastfm)),
        ];
        let mut coordinator = EnrichCoordinator::new(
            PartitionStore::new("unused"),
            sources,
            EnrichOptions::default(),
            Arc::new(TracingReporter),
        );

        let mut record = StreamRecord::new("2022-06-01T12:00:00Z".parse().unwrap(), 219_706);
        record.artist_name = Some("Wolf Alice".to_string());
        record.track_name = Some("Bros".to_string());
        let mut table = PartitionTable::empty(2022);
        table.records.push(record);

        let report = coordinator
            .enrich_table(&mut table, |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(report.enriched, 1);
        assert!(report.degraded.is_empty());
        assert_eq!(table.records[0].genres.as_deref(), Some("indie, pop, rock"));
    }

    #[tokio::test]
    async fn test_unknown_artist_is_looked_up_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/"))
            .and(query_param("artist", "Nobody"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(include_str!("fixtures/lastfm_error_not_found.json")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sources: Vec<Box<dyn GenreSource>> = vec![Box::new(lastfm_source(&server))];
        let mut coordinator = EnrichCoordinator::new(
            PartitionStore::new("unused"),
            sources,
            EnrichOptions::default(),
            Arc::new(TracingReporter),
        );

        let mut table = PartitionTable::empty(2022);
        for ts in ["2022-06-01T12:00:00Z", "2022-06-02T12:00:00Z"] {
            let mut record = StreamRecord::new(ts.parse().unwrap(), 1000);
            record.artist_name = Some("Nobody".to_string());
            record.track_name = Some("Nothing".to_string());
            table.records.push(record);
        }

        let report = coordinator
            .enrich_table(&mut table, |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(report.memo_hits, 1);
        assert!(report.degraded.is_empty());
        assert!(table.records.iter().all(|r| r.genres.as_deref() == Some("")));
    }
}

mod rate_limit_tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(100);

    fn delayed_settings() -> PipelineSettings {
        PipelineSettings {
            request_delay: DELAY,
            ..test_settings()
        }
    }

    #[tokio::test]
    async fn test_lastfm_lookups_respect_min_delay() {
        let server = MockServer::start().await;
        mount_lastfm_wolf_alice(&server).await;

        let credentials = LastFmCredentials {
            api_key: "test-api-key".to_string(),
            api_secret: "test-api-secret".to_string(),
        };
        let mut source =
            LastFmSource::with_base_url(credentials, &delayed_settings(), &server.uri()).unwrap();

        let lookups = 5;
        let start = Instant::now();
        for _ in 0..lookups {
            source.fetch_tags("Wolf Alice", "Bros").await.unwrap();
        }

        assert!(start.elapsed() >= DELAY * (lookups - 1));
    }

    #[tokio::test]
    async fn test_spotify_charges_every_request() {
        let server = MockServer::start().await;
        mount_spotify_token(&server, 1).await;
        mount_spotify_wolf_alice(&server).await;

        let credentials = SpotifyCredentials {
            client_id: "test-client-id".to_string(),
            client_secret: "test-client-secret".to_string(),
        };
        let mut source = SpotifySource::with_base_urls(
            credentials,
            &delayed_settings(),
            &server.uri(),
            &server.uri(),
        )
        .unwrap();

        // Token, search and artist requests each wait their turn
        let start = Instant::now();
        source.fetch_tags("Wolf Alice", "Bros").await.unwrap();
        assert!(start.elapsed() >= DELAY * 2);

        // Cached token: only the artist request is a full delay after the search
        let start = Instant::now();
        source.fetch_tags("Wolf Alice", "Bros").await.unwrap();
        assert!(start.elapsed() >= DELAY);
    }
}
