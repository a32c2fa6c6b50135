//! Creation-time range filters for the vector index.
//!
//! Callers pass local wall-clock timestamps (`2006-01-02 15:04:05` layout) in
//! the fixed zone the articles were stamped in. They are converted to UTC and
//! rendered as an inclusive epoch-second range on the indexed creation field.

use crate::{TimeParseError, TimeRange, ValidationError};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTC+08:00, the zone stored article and user timestamps use.
pub const DEFAULT_UTC_OFFSET_SECONDS: i32 = 8 * 3600;

pub fn local_offset(seconds: i32) -> Result<FixedOffset, ValidationError> {
    FixedOffset::east_opt(seconds).ok_or_else(|| ValidationError::InvalidField {
        field: "utc_offset_seconds",
        details: format!("{seconds} is outside +/-86400"),
    })
}

pub fn parse_local_timestamp(
    field: &'static str,
    value: &str,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, TimeParseError> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), LOCAL_TIMESTAMP_FORMAT).map_err(
        |error| TimeParseError {
            field,
            value: value.to_string(),
            details: error.to_string(),
        },
    )?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| TimeParseError {
            field,
            value: value.to_string(),
            details: "ambiguous local time".to_string(),
        })
}

impl TimeRange {
    /// Builds a range only when both ends are given. A single bound yields
    /// `Ok(None)`: no partial filters.
    pub fn from_local(
        start: Option<&str>,
        end: Option<&str>,
        offset: FixedOffset,
    ) -> Result<Option<TimeRange>, TimeParseError> {
        let start = start.filter(|value| !value.trim().is_empty());
        let end = end.filter(|value| !value.trim().is_empty());

        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(TimeRange {
                start: parse_local_timestamp("start_time", start, offset)?,
                end: parse_local_timestamp("end_time", end, offset)?,
            })),
            _ => Ok(None),
        }
    }
}

/// Inclusive range predicate over an indexed payload field, in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub key: String,
    pub gte: i64,
    pub lte: i64,
}

impl RangeFilter {
    pub fn created_between(key: impl Into<String>, range: &TimeRange) -> Self {
        Self {
            key: key.into(),
            gte: range.start.timestamp(),
            lte: range.end.timestamp(),
        }
    }

    pub fn to_qdrant(&self) -> Value {
        json!({
            "must": [
                {
                    "key": self.key,
                    "range": {
                        "gte": self.gte,
                        "lte": self.lte,
                    }
                }
            ]
        })
    }
}
