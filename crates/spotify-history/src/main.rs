use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use spotify_history::cli::{commands, OutputFormat};
use spotify_history::config::{CatalogCredentials, PipelineSettings, DEFAULT_CHECKPOINT_EVERY};
use spotify_history::ingest::DedupKey;
use spotify_history::report::DEFAULT_TOP;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spotify-history")]
#[command(author, version, about = "Spotify streaming history pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the yearly partitions
    #[arg(long, global = true, env = "SPOTIFY_HISTORY_DIR")]
    data_dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load exports into yearly partitions, then sort and deduplicate them
    Ingest {
        /// Glob pattern of JSON exports, e.g. "Streaming_History_Audio_*.json"
        pattern: String,
        /// Columns that identify a duplicate event
        #[arg(long, value_enum, default_value_t = DedupKey::default())]
        dedup_key: DedupKey,
    },
    /// Sort and deduplicate partitions without ingesting
    Consolidate {
        /// Only this year
        #[arg(short, long)]
        year: Option<i32>,
        /// Columns that identify a duplicate event
        #[arg(long, value_enum, default_value_t = DedupKey::default())]
        dedup_key: DedupKey,
    },
    /// Add genres from Spotify and Last.fm to a partition
    Enrich {
        /// Partition year
        year: i32,
        /// Save progress after this many rows
        #[arg(long, default_value_t = DEFAULT_CHECKPOINT_EVERY)]
        checkpoint_every: usize,
        /// Minimum delay between two calls to the same catalog, in milliseconds
        #[arg(long, default_value = "250")]
        delay_ms: u64,
        /// Timeout of a single catalog request, in seconds
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
        /// Stop after this many rows; the rest is picked up by the next run
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
        spotify_client_id: Option<String>,
        #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
        spotify_client_secret: Option<String>,
        #[arg(long, env = "LASTFM_API_KEY", hide_env_values = true)]
        lastfm_api_key: Option<String>,
        #[arg(long, env = "LASTFM_API_SECRET", hide_env_values = true)]
        lastfm_api_secret: Option<String>,
    },
    /// Show listening statistics for a partition
    Report {
        /// Partition year
        year: i32,
        /// Entries per ranking
        #[arg(short, long, default_value_t = DEFAULT_TOP)]
        top: usize,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List partitions and their enrichment progress
    Status,
}

#[tokio::main]
async fn main() -> spotify_history::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match cli.data_dir {
        Some(dir) => PipelineSettings::with_output_dir(dir),
        None => PipelineSettings::default(),
    };

    let result = match cli.command {
        Commands::Ingest { pattern, dedup_key } => {
            settings.dedup_key = dedup_key;
            commands::ingest(&pattern, &settings)
        }
        Commands::Consolidate { year, dedup_key } => {
            settings.dedup_key = dedup_key;
            commands::consolidate(year, &settings)
        }
        Commands::Enrich {
            year,
            checkpoint_every,
            delay_ms,
            timeout_secs,
            limit,
            spotify_client_id,
            spotify_client_secret,
            lastfm_api_key,
            lastfm_api_secret,
        } => {
            settings.checkpoint_every = checkpoint_every;
            settings.request_delay = Duration::from_millis(delay_ms);
            settings.request_timeout = Duration::from_secs(timeout_secs);
            match CatalogCredentials::new(
                spotify_client_id,
                spotify_client_secret,
                lastfm_api_key,
                lastfm_api_secret,
            ) {
                Ok(credentials) => commands::enrich(year, limit, credentials, &settings).await,
                Err(e) => Err(e),
            }
        }
        Commands::Report { year, top, format } => commands::report(year, top, format, &settings),
        Commands::Status => commands::status(&settings),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
