//! Consolidate command for spotify-history

use std::sync::Arc;

use crate::config::PipelineSettings;
use crate::error::Result;
use crate::ingest::{ConsolidationStats, IngestCoordinator};
use crate::progress::TracingReporter;

/// Sort and deduplicate one partition, or all of them
pub fn run(year: Option<i32>, settings: &PipelineSettings) -> Result<()> {
    let coordinator = IngestCoordinator::from_settings(settings, Arc::new(TracingReporter));

    let consolidated = match year {
        Some(year) => vec![coordinator.consolidate(year)?],
        None => {
            let report = coordinator.consolidate_all()?;
            for error in &report.failed {
                println!("Failed: {}", error);
            }
            report.consolidated
        }
    };

    if consolidated.is_empty() {
        println!("No partitions in {}", settings.output_dir.display());
        return Ok(());
    }

    print_stats(&consolidated);
    Ok(())
}

fn print_stats(stats: &[ConsolidationStats]) {
    println!("{:<6} {:>10} {:>10} {:>11}", "Year", "Before", "After", "Duplicates");
    println!("{}", "-".repeat(40));
    for s in stats {
        println!(
            "{:<6} {:>10} {:>10} {:>11}",
            s.year,
            s.rows_before,
            s.rows_after,
            s.duplicates_removed()
        );
    }
}
