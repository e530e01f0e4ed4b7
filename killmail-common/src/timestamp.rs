//! Strict parsing of the UTC timestamps found in authoritative killmails.
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// The only accepted layout. Fractional seconds and offsets other than `Z` are rejected.
pub const KILLMAIL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Byte-level template for `KILLMAIL_TIME_FORMAT`, `d` stands for an ASCII digit.
const SHAPE: &[u8; 20] = b"dddd-dd-ddTdd:dd:ddZ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a YYYY-MM-DDTHH:MM:SSZ timestamp")]
pub struct InvalidTimestamp(pub String);

/// Parse `s` as a UTC timestamp and return seconds since the Unix epoch.
pub fn parse_utc(s: &str) -> Result<i64, InvalidTimestamp> {
    parse_utc_datetime(s).map(|datetime| datetime.timestamp())
}

/// Parse `s` as a UTC timestamp. No local timezone adjustment is ever applied.
pub fn parse_utc_datetime(s: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    // chrono accepts unpadded fields and signed years, so the exact widths are checked first.
    if !has_strict_shape(s) {
        return Err(InvalidTimestamp(s.to_owned()));
    }

    NaiveDateTime::parse_from_str(s, KILLMAIL_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| InvalidTimestamp(s.to_owned()))
}

fn has_strict_shape(s: &str) -> bool {
    let bytes = s.as_bytes();

    bytes.len() == SHAPE.len()
        && bytes
            .iter()
            .zip(SHAPE.iter())
            .all(|(byte, expected)| match expected {
                b'd' => byte.is_ascii_digit(),
                literal => byte == literal,
            })
}
