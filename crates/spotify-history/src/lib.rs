pub mod cli;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod report;
pub mod storage;

pub use error::{HistoryError, Result};
