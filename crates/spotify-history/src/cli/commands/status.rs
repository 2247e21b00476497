//! Status command for spotify-history

use crate::config::PipelineSettings;
use crate::error::Result;
use crate::storage::PartitionStore;

/// List partitions with their row counts and enrichment progress
pub fn run(settings: &PipelineSettings) -> Result<()> {
    let store = PartitionStore::new(&settings.output_dir);
    println!("Partitions in: {}", store.base_path().display());

    let summaries = store.summaries()?;
    if summaries.is_empty() {
        println!("No partitions yet. Run `spotify-history ingest <PATTERN>` first.");
        return Ok(());
    }

    println!("{:<6} {:>10} {:>10} {:>9}", "Year", "Rows", "Enriched", "Progress");
    println!("{}", "-".repeat(38));
    for summary in &summaries {
        let progress = if !summary.has_genre_column {
            "-".to_string()
        } else if summary.rows == 0 {
            "100%".to_string()
        } else {
            format!("{}%", summary.enriched * 100 / summary.rows)
        };
        println!(
            "{:<6} {:>10} {:>10} {:>9}",
            summary.year, summary.rows, summary.enriched, progress
        );
    }

    Ok(())
}
