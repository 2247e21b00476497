//! Storage layer for streaming history
//!
//! Listening events are stored as one Parquet file per calendar year.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/spotify-history/
//! └── spotify_data_by_year/
//!     ├── spotify_data_2021.parquet
//!     ├── spotify_data_2022.parquet
//!     └── ...
//! ```
//!
//! ## Concurrent Access
//!
//! Partition files are written atomically (temp file + rename), so readers
//! always see a complete partition. External tools can query them directly:
//!
//! ```sql
//! SELECT * FROM 'spotify_data_by_year/spotify_data_*.parquet' WHERE ms_played > 30000;
//! ```

mod parquet;
pub mod partitions;

pub use parquet::{AppendOutcome, AppendedPartition, PartitionStore, PartitionSummary};
pub use partitions::PartitionTable;

use std::path::PathBuf;

/// Directory name of the yearly partitions inside the data directory
pub const PARTITION_DIR_NAME: &str = "spotify_data_by_year";

/// Get the default partition directory
pub fn default_storage_path() -> PathBuf {
    crate::config::data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(PARTITION_DIR_NAME)
}
