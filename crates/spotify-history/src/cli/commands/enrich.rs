//! Enrich command for spotify-history

use std::sync::Arc;

use crate::config::{CatalogCredentials, PipelineSettings};
use crate::enrich::EnrichCoordinator;
use crate::error::Result;
use crate::progress::TracingReporter;

/// Add genres to the partition of `year`
pub async fn run(
    year: i32,
    limit: Option<usize>,
    credentials: CatalogCredentials,
    settings: &PipelineSettings,
) -> Result<()> {
    let mut coordinator = EnrichCoordinator::from_settings(
        settings,
        credentials,
        limit,
        Arc::new(TracingReporter),
    )?;

    println!(
        "Enriching {}",
        coordinator.store().partition_path(year).display()
    );
    let report = coordinator.enrich(year).await?;

    if !report.unidentified.is_empty() {
        println!("Rows without an artist (stored with empty genres):");
        for identity in &report.unidentified {
            println!("  {}", identity);
        }
    }
    if !report.degraded.is_empty() {
        println!("Failed lookups:");
        for lookup in &report.degraded {
            println!(
                "  {} - {} [{}]: {}",
                lookup.artist, lookup.track, lookup.source, lookup.error
            );
        }
    }

    println!("\n{}", report);
    Ok(())
}
