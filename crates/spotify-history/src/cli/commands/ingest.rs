//! Ingest command for spotify-history

use std::sync::Arc;

use crate::config::PipelineSettings;
use crate::error::Result;
use crate::ingest::IngestCoordinator;
use crate::progress::TracingReporter;

/// Ingest every export matching `pattern` and consolidate the partitions
pub fn run(pattern: &str, settings: &PipelineSettings) -> Result<()> {
    settings.validate()?;
    println!("Writing partitions to: {}", settings.output_dir.display());

    let coordinator = IngestCoordinator::from_settings(settings, Arc::new(TracingReporter));
    let report = coordinator.ingest(pattern)?;

    if report.files.is_empty() && report.skipped_files.is_empty() {
        println!("No files match {}", pattern);
        return Ok(());
    }

    println!("{:<40} {:>10} {:>10}", "File", "Accepted", "Rejected");
    println!("{}", "-".repeat(62));
    for file in &report.files {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.path.display().to_string());
        println!("{:<40} {:>10} {:>10}", name, file.accepted, file.rejected);
    }

    for error in &report.skipped_files {
        println!("Skipped: {}", error);
    }
    for rejected in &report.rejected_records {
        println!("Dropped from {}: {}", rejected.path.display(), rejected.error);
    }
    for error in report
        .partition_failures
        .iter()
        .chain(&report.consolidation.failed)
    {
        println!("Failed: {} (retried on the next run)", error);
    }

    println!("\n{}", report);
    Ok(())
}
