pub mod consolidate;
pub mod enrich;
pub mod ingest;
pub mod report;
pub mod status;

pub use consolidate::run as consolidate;
pub use enrich::run as enrich;
pub use ingest::run as ingest;
pub use report::run as report;
pub use status::run as status;
