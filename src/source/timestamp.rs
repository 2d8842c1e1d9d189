use crate::config::types::ApiVersion;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// `strftime` layout used in output file names.
pub const FILE_STAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

const CLASSIC_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("failed to parse timestamp '{value}' as {format}: {source}")]
    ParseError {
        value: String,
        format: &'static str,
        #[source]
        source: chrono::ParseError,
    },
}

/// Layout of a record's `created_at`, which depends on the API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// `Thu Jan 28 09:28:54 +0000 2021`
    Classic,
    /// `2021-01-28T09:28:54.000Z`
    Iso8601,
}

impl From<ApiVersion> for TimestampFormat {
    fn from(version: ApiVersion) -> Self {
        match version {
            ApiVersion::V1 => TimestampFormat::Classic,
            ApiVersion::V2 => TimestampFormat::Iso8601,
        }
    }
}

impl TimestampFormat {
    pub fn parse(&self, value: &str) -> Result<DateTime<Utc>, TimestampError> {
        match self {
            TimestampFormat::Classic => DateTime::parse_from_str(value, CLASSIC_FORMAT)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|source| TimestampError::ParseError {
                    value: value.to_string(),
                    format: "classic",
                    source,
                }),
            TimestampFormat::Iso8601 => DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    // Some payloads drop the zone designator entirely
                    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                        .map(|ndt| Utc.from_utc_datetime(&ndt))
                })
                .map_err(|source| TimestampError::ParseError {
                    value: value.to_string(),
                    format: "iso8601",
                    source,
                }),
        }
    }
}

pub fn format_file_stamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(FILE_STAMP_FORMAT).to_string()
}

/// Recover the `-YYYY-MM-DD-HH-MM-SS-` stamp embedded in a rotated file name.
pub fn parse_file_stamp(file_name: &str) -> Option<NaiveDateTime> {
    static STAMP: OnceLock<Regex> = OnceLock::new();
    let re = STAMP.get_or_init(|| {
        Regex::new(r"-(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2})-").expect("stamp regex is valid")
    });

    let stamp = re.captures(file_name)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(stamp, FILE_STAMP_FORMAT).ok()
}
