//! Conversions between the query API's loosely typed rows and our records.
//! Everything that comes off the wire passes through here once, so the rest of
//! the crate only ever sees one shape per record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer};

/// An embedded relation can come back as a single object or as a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Accept `null`, an object, or a list of objects and keep the first one.
///
/// # Errors
/// Returns an error if the value is none of the above.
pub fn deserialize_one_or_many<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<OneOrMany<T>> = Option::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(OneOrMany::One(item)) => Some(item),
        Some(OneOrMany::Many(items)) => items.into_iter().next(),
    })
}

/// Accept an RFC 3339 timestamp, a timestamp without an offset, or a plain date.
/// Anything else is logged and dropped rather than failing the whole row.
///
/// # Errors
/// Returns an error only if the value is not a string or null.
pub fn deserialize_start_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_start_date))
}

#[must_use]
pub fn parse_start_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(dt) = date.and_hms_opt(0, 0, 0)
    {
        return Some(dt.and_utc());
    }
    warn!("Ignoring unparseable start date {raw:?}");
    None
}

/// Make sure a base URL has a scheme and a trailing slash.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim();
    let mut url = if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Build a PostgREST equality filter value.
#[must_use]
pub fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

/// Build a PostgREST `in` filter value. Every id is quoted so commas and
/// parentheses inside ids can't break the list.
#[must_use]
pub fn in_filter<S: AsRef<str>>(values: &[S]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}
