//! Date/time helpers.
//!
//! Candle timestamps are naive local (KST) times as reported by the exchange.
//! The candle API expects its `to` parameter in UTC.

use chrono::{Duration, NaiveDateTime};

use crate::error::{Error, Result};

/// Format used for every persisted timestamp.
pub const ISO_DATEFORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// KST is UTC+9 with no daylight saving.
const KST_OFFSET_HOURS: i64 = 9;

/// Parse `2020-04-30T16:30:00` (a space separator is accepted as well).
pub fn parse_date_time(s: &str) -> Result<NaiveDateTime> {
    let trimmed = s.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, ISO_DATEFORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| Error::data(format!("invalid date time '{s}': {e}")))
}

/// Format a timestamp with [`ISO_DATEFORMAT`].
pub fn format_date_time(dt: &NaiveDateTime) -> String {
    dt.format(ISO_DATEFORMAT).to_string()
}

/// Convert a KST wall-clock time to UTC.
pub fn kst_to_utc(dt: NaiveDateTime) -> NaiveDateTime {
    dt - Duration::hours(KST_OFFSET_HOURS)
}

/// UTC string for the candle API `to` parameter, e.g. `2020-04-30T07:30:00Z`.
pub fn to_utc_query_string(kst: NaiveDateTime) -> String {
    format!("{}Z", format_date_time(&kst_to_utc(kst)))
}

/// Serde adapter for [`NaiveDateTime`] fields using [`ISO_DATEFORMAT`].
pub mod date_time_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date_time(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_date_time(&s).map_err(serde::de::Error::custom)
    }
}

/// Same as [`date_time_format`] for optional fields.
pub mod opt_date_time_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&super::format_date_time(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| super::parse_date_time(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
