//! Listening statistics over a yearly partition
//!
//! Aggregates are computed by DuckDB straight from the Parquet file, the same
//! way an external tool would query it.

use std::path::{Path, PathBuf};

use chrono::Month;
use duckdb::Connection;
use serde::Serialize;

use crate::error::{HistoryError, Result};
use crate::models::stream::{ALBUM_NAME, ARTIST_NAME, MS_PLAYED, TRACK_NAME, TS};
use crate::storage::PartitionStore;

/// Entries per ranking unless asked otherwise
pub const DEFAULT_TOP: usize = 15;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// One line of a ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// Artist, song or album name
    pub name: String,
    /// Performing artist, for songs and albums
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub hours: f64,
    pub plays: i64,
}

/// Most played artists and songs of one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTop {
    pub month: u32,
    pub month_name: String,
    pub artists: Vec<RankedEntry>,
    pub songs: Vec<RankedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub path: PathBuf,
    pub top: usize,
    pub plays: i64,
    pub total_hours: f64,
    pub top_artists_by_time: Vec<RankedEntry>,
    pub top_songs_by_time: Vec<RankedEntry>,
    pub top_albums_by_time: Vec<RankedEntry>,
    pub top_artists_by_plays: Vec<RankedEntry>,
    pub top_songs_by_plays: Vec<RankedEntry>,
    pub monthly: Vec<MonthlyTop>,
}

/// What a ranking groups by
#[derive(Debug, Clone, Copy)]
enum Grouping {
    Artist,
    Song,
    Album,
}

impl Grouping {
    fn name_column(self) -> &'static str {
        match self {
            Grouping::Artist => ARTIST_NAME,
            Grouping::Song => TRACK_NAME,
            Grouping::Album => ALBUM_NAME,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RankBy {
    Hours,
    Plays,
}

/// Analyze the partition of `year` held by `store`
pub fn analyze_year(store: &PartitionStore, year: i32, top: usize) -> Result<PartitionReport> {
    let path = store.partition_path(year);
    if !path.exists() {
        return Err(HistoryError::NotFound(format!(
            "No partition for {} at {}",
            year,
            path.display()
        )));
    }
    analyze(&path, top)
}

/// Compute every ranking of one partition file
pub fn analyze(path: &Path, top: usize) -> Result<PartitionReport> {
    if top == 0 {
        return Err(HistoryError::invalid_param("top must be at least 1"));
    }

    let conn = Connection::open_in_memory()
        .map_err(|e| HistoryError::Database(format!("Failed to open DuckDB: {}", e)))?;
    let source = format!(
        "read_parquet('{}')",
        path.display().to_string().replace('\'', "''")
    );

    let (plays, total_hours) = conn
        .query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(CAST(SUM({ms}) AS DOUBLE), 0) / {per_hour} FROM {source}",
                ms = MS_PLAYED,
                per_hour = MS_PER_HOUR,
                source = source
            ),
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )
        .map_err(|e| query_error(path, e))?;

    let ranking = |grouping, rank_by, filter: &str| {
        ranked(&conn, path, &source, grouping, rank_by, filter, top)
    };

    let mut monthly = Vec::new();
    for month in months(&conn, path, &source)? {
        let filter = format!("month({}) = {}", TS, month);
        monthly.push(MonthlyTop {
            month,
            month_name: month_name(month),
            artists: ranking(Grouping::Artist, RankBy::Plays, &filter)?,
            songs: ranking(Grouping::Song, RankBy::Plays, &filter)?,
        });
    }

    Ok(PartitionReport {
        path: path.to_path_buf(),
        top,
        plays,
        total_hours,
        top_artists_by_time: ranking(Grouping::Artist, RankBy::Hours, "TRUE")?,
        top_songs_by_time: ranking(Grouping::Song, RankBy::Hours, "TRUE")?,
        top_albums_by_time: ranking(Grouping::Album, RankBy::Hours, "TRUE")?,
        top_artists_by_plays: ranking(Grouping::Artist, RankBy::Plays, "TRUE")?,
        top_songs_by_plays: ranking(Grouping::Song, RankBy::Plays, "TRUE")?,
        monthly,
    })
}

fn ranked(
    conn: &Connection,
    path: &Path,
    source: &str,
    grouping: Grouping,
    rank_by: RankBy,
    filter: &str,
    top: usize,
) -> Result<Vec<RankedEntry>> {
    let name = grouping.name_column();
    // Groups with a missing key are left out of the ranking
    let (artist_select, group_by, keys_present) = match grouping {
        Grouping::Artist => (
            "NULL::VARCHAR".to_string(),
            name.to_string(),
            format!("{} IS NOT NULL", name),
        ),
        Grouping::Song | Grouping::Album => (
            ARTIST_NAME.to_string(),
            format!("{}, {}", name, ARTIST_NAME),
            format!("{} IS NOT NULL AND {} IS NOT NULL", name, ARTIST_NAME),
        ),
    };
    let order = match rank_by {
        RankBy::Hours => "hours DESC, plays DESC",
        RankBy::Plays => "plays DESC, hours DESC",
    };

    let sql = format!(
        "SELECT {name}, {artist_select}, CAST(SUM({ms}) AS DOUBLE) / {per_hour} AS hours, COUNT(*) AS plays
         FROM {source}
         WHERE {keys_present} AND {filter}
         GROUP BY {group_by}
         ORDER BY {order}, {name}
         LIMIT {top}",
        name = name,
        artist_select = artist_select,
        keys_present = keys_present,
        ms = MS_PLAYED,
        per_hour = MS_PER_HOUR,
        source = source,
        filter = filter,
        group_by = group_by,
        order = order,
        top = top
    );

    let mut stmt = conn.prepare(&sql).map_err(|e| query_error(path, e))?;
    let entries = stmt
        .query_map([], |row| {
            Ok(RankedEntry {
                name: row.get(0)?,
                artist: row.get(1)?,
                hours: row.get(2)?,
                plays: row.get(3)?,
            })
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| query_error(path, e))?;

    Ok(entries)
}

/// Calendar months that have at least one play, ascending
fn months(conn: &Connection, path: &Path, source: &str) -> Result<Vec<u32>> {
    let sql = format!(
        "SELECT DISTINCT month({ts}) AS m FROM {source} ORDER BY m",
        ts = TS,
        source = source
    );
    let mut stmt = conn.prepare(&sql).map_err(|e| query_error(path, e))?;
    let months = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| query_error(path, e))?;

    Ok(months.into_iter().filter_map(|m| u32::try_from(m).ok()).collect())
}

fn month_name(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| format!("Month {}", month))
}

fn query_error(path: &Path, e: duckdb::Error) -> HistoryError {
    HistoryError::Database(format!("Failed to analyze {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamRecord;
    use crate::storage::PartitionTable;
    use tempfile::TempDir;

    fn play(ts: &str, artist: &str, track: &str, album: &str, minutes: u64) -> StreamRecord {
        let mut r = StreamRecord::new(ts.parse().unwrap(), minutes * 60_000);
        r.artist_name = Some(artist.to_string());
        r.track_name = Some(track.to_string());
        r.album_name = Some(album.to_string());
        r
    }

    fn store_with(records: Vec<StreamRecord>) -> (TempDir, PartitionStore) {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        let mut table = PartitionTable::empty(2022);
        table.records = records;
        store.replace(&table).unwrap();
        (temp, store)
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), "January");
        assert_eq!(month_name(12), "December");
        assert_eq!(month_name(13), "Month 13");
    }

    #[test]
    fn test_rankings() {
        let (_temp, store) = store_with(vec![
            play("2022-01-05T10:00:00Z", "Björk", "Jóga", "Homogenic", 60),
            play("2022-01-06T10:00:00Z", "Portishead", "Roads", "Dummy", 5),
            play("2022-01-07T10:00:00Z", "Portishead", "Roads", "Dummy", 5),
            play("2022-03-01T10:00:00Z", "Portishead", "Glory Box", "Dummy", 5),
        ]);

        let report = analyze_year(&store, 2022, 15).unwrap();

        assert_eq!(report.plays, 4);
        assert!((report.total_hours - 75.0 / 60.0).abs() < 1e-9);

        assert_eq!(report.top_artists_by_time[0].name, "Björk");
        assert!((report.top_artists_by_time[0].hours - 1.0).abs() < 1e-9);
        assert_eq!(report.top_artists_by_plays[0].name, "Portishead");
        assert_eq!(report.top_artists_by_plays[0].plays, 3);
        assert_eq!(report.top_artists_by_plays[0].artist, None);

        assert_eq!(report.top_songs_by_plays[0].name, "Roads");
        assert_eq!(report.top_songs_by_plays[0].artist.as_deref(), Some("Portishead"));
        assert_eq!(report.top_albums_by_time[0].name, "Homogenic");

        let months: Vec<_> = report.monthly.iter().map(|m| m.month_name.as_str()).collect();
        assert_eq!(months, vec!["January", "March"]);
        assert_eq!(report.monthly[1].songs[0].name, "Glory Box");
    }

    #[test]
    fn test_top_limits_entries() {
        let (_temp, store) = store_with(vec![
            play("2022-01-01T00:00:00Z", "A", "a", "x", 3),
            play("2022-01-02T00:00:00Z", "B", "b", "y", 2),
            play("2022-01-03T00:00:00Z", "C", "c", "z", 1),
        ]);

        let report = analyze_year(&store, 2022, 2).unwrap();
        let names: Vec<_> = report.top_artists_by_time.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_rows_without_metadata_are_ignored_in_rankings() {
        let mut episode = StreamRecord::new("2022-02-01T00:00:00Z".parse().unwrap(), 600_000);
        episode.track_name = None;
        let (_temp, store) = store_with(vec![
            episode,
            play("2022-02-02T00:00:00Z", "A", "a", "x", 6),
        ]);

        let report = analyze_year(&store, 2022, 15).unwrap();
        assert_eq!(report.plays, 2);
        assert_eq!(report.top_artists_by_time.len(), 1);
        assert!((report.total_hours - 16.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_songs_and_albums_without_artist_are_not_ranked() {
        let mut unattributed = play("2022-04-01T00:00:00Z", "A", "Untitled", "Demos", 30);
        unattributed.artist_name = None;
        let (_temp, store) = store_with(vec![
            unattributed,
            play("2022-04-02T00:00:00Z", "A", "a", "x", 6),
        ]);

        let report = analyze_year(&store, 2022, 15).unwrap();

        let songs: Vec<_> = report.top_songs_by_time.iter().map(|e| e.name.as_str()).collect();
        let albums: Vec<_> = report.top_albums_by_time.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(songs, vec!["a"]);
        assert_eq!(albums, vec!["x"]);
        assert_eq!(report.top_songs_by_plays.len(), 1);
        assert_eq!(report.monthly[0].songs.len(), 1);
        assert_eq!(report.plays, 2);
    }

    #[test]
    fn test_missing_partition() {
        let temp = TempDir::new().unwrap();
        let store = PartitionStore::new(temp.path());
        assert!(matches!(
            analyze_year(&store, 1999, 15),
            Err(HistoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_zero_top_rejected() {
        assert!(matches!(
            analyze(Path::new("unused.parquet"), 0),
            Err(HistoryError::InvalidParameter(_))
        ));
    }
}
