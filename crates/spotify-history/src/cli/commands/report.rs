//! Report command for spotify-history

use crate::cli::OutputFormat;
use crate::config::PipelineSettings;
use crate::error::Result;
use crate::report::{analyze_year, PartitionReport, RankedEntry};
use crate::storage::PartitionStore;

/// Print listening statistics for the partition of `year`
pub fn run(year: i32, top: usize, format: OutputFormat, settings: &PipelineSettings) -> Result<()> {
    let store = PartitionStore::new(&settings.output_dir);
    let report = analyze_year(&store, year, top)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &PartitionReport) {
    let top = report.top;
    println!("\nTotal listening time: {:.2} hours", report.total_hours);

    println!("\nTop {} artists by listening time in hours:", top);
    print_hours(&report.top_artists_by_time);

    println!("\nTop {} songs by listening time in hours:", top);
    print_hours(&report.top_songs_by_time);

    println!("\nTop {} albums by listening time in hours:", top);
    print_hours(&report.top_albums_by_time);

    println!("\nTop {} artists by number of plays:", top);
    print_plays(&report.top_artists_by_plays);

    println!("\nTop {} songs by number of plays:", top);
    print_plays(&report.top_songs_by_plays);

    println!("\nMonthly top artists and songs:");
    for month in &report.monthly {
        println!("\n{}", month.month_name);
        println!("{}", "-".repeat(month.month_name.len()));

        println!("Top {} artists by number of plays:", top);
        print_plays(&month.artists);

        println!("Top {} songs by number of plays:", top);
        print_plays(&month.songs);
    }
}

fn label(entry: &RankedEntry) -> String {
    match &entry.artist {
        Some(artist) => format!("{} by {}", entry.name, artist),
        None => entry.name.clone(),
    }
}

fn print_hours(entries: &[RankedEntry]) {
    for entry in entries {
        println!("{}: {:.2}", label(entry), entry.hours);
    }
}

fn print_plays(entries: &[RankedEntry]) {
    for entry in entries {
        println!("{}: {}", label(entry), entry.plays);
    }
}
