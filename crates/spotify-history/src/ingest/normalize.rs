//! Raw export records to canonical [`StreamRecord`]s

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{HistoryError, Result};
use crate::models::stream::{self, StreamRecord};

/// Naive timestamp layouts accepted besides RFC 3339 (read as UTC)
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Records of one input file after normalization
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Accepted records, in input order
    pub records: Vec<StreamRecord>,
    /// One `MalformedRecord` error per dropped element
    pub rejected: Vec<HistoryError>,
}

/// Normalize every element of an export array.
///
/// Malformed elements are collected in `rejected`; they never fail the batch.
pub fn normalize_batch(values: &[Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, value) in values.iter().enumerate() {
        match normalize_value(index, value) {
            Ok(record) => batch.records.push(record),
            Err(e) => batch.rejected.push(e),
        }
    }

    batch
}

/// Normalize one raw export element.
///
/// Only the recognized columns are kept. The timestamp is mandatory; every
/// other field degrades to `None` when absent or of an unexpected type.
pub fn normalize_value(index: usize, value: &Value) -> Result<StreamRecord> {
    let obj = value
        .as_object()
        .ok_or_else(|| HistoryError::malformed(index, "element is not a JSON object"))?;

    let ts = match obj.get(stream::TS) {
        None | Some(Value::Null) => {
            return Err(HistoryError::malformed(index, "missing timestamp field 'ts'"))
        }
        Some(Value::String(raw)) => parse_timestamp(raw).ok_or_else(|| {
            HistoryError::malformed(index, format!("unparseable timestamp '{}'", raw))
        })?,
        Some(other) => {
            return Err(HistoryError::malformed(
                index,
                format!("timestamp is not a string: {}", other),
            ))
        }
    };

    let ms_played = match obj.get(stream::MS_PLAYED) {
        None | Some(Value::Null) => 0,
        Some(value) => non_negative_integer(value).ok_or_else(|| {
            HistoryError::malformed(
                index,
                format!("ms_played must be a non-negative integer, got {}", value),
            )
        })?,
    };

    Ok(StreamRecord {
        ts,
        platform: string_field(obj, stream::PLATFORM),
        ms_played,
        conn_country: string_field(obj, stream::CONN_COUNTRY),
        track_name: string_field(obj, stream::TRACK_NAME),
        artist_name: string_field(obj, stream::ARTIST_NAME),
        album_name: string_field(obj, stream::ALBUM_NAME),
        track_uri: string_field(obj, stream::TRACK_URI),
        reason_start: string_field(obj, stream::REASON_START),
        reason_end: string_field(obj, stream::REASON_END),
        shuffle: bool_field(obj, stream::SHUFFLE),
        skipped: bool_field(obj, stream::SKIPPED),
        offline: bool_field(obj, stream::OFFLINE),
        offline_timestamp: obj.get(stream::OFFLINE_TIMESTAMP).and_then(integer),
        genres: None,
    })
}

/// Parse an export timestamp into a UTC instant, truncated to microseconds
/// (the precision partitions store).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| naive.and_utc())
        })?;

    DateTime::from_timestamp_micros(parsed.timestamp_micros())
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn non_negative_integer(value: &Value) -> Option<u64> {
    integer(value).and_then(|v| u64::try_from(v).ok())
}
