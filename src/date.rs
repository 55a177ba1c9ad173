//! Reminder date normalization.
//!
//! Reminder dates reach the engine in whatever shape the task store produced: ISO-8601
//! strings, `{ "$date": .. }` / `{ "date": .. }` wrappers, epoch milliseconds (as numbers or
//! numeric strings) or already-typed instants. [`normalize`] turns any of them into a single
//! point in time plus its wall-clock fields in the local zone, or a [`NormalizationError`].
//! It never panics.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat,
    TimeZone, Timelike, Utc,
};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Largest magnitude accepted for epoch milliseconds (ECMAScript time value range).
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// Date-times without an offset are wall-clock times in the local zone.
const LOCAL_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq)]
pub enum RawDate {
    /// Any string value: ISO-8601 text or a numeric epoch string.
    Iso(String),
    /// One level of `{ "date": .. }` or `{ "$date": .. }` wrapping.
    Wrapped(Box<RawDate>),
    Native(DateTime<Utc>),
    /// Milliseconds since the Unix epoch.
    Epoch(f64),
    /// A JSON value with no recognised date shape.
    Unrecognized(Value),
}

impl From<Value> for RawDate {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => RawDate::Iso(text),
            Value::Number(number) => match number.as_f64() {
                Some(millis) => RawDate::Epoch(millis),
                None => RawDate::Unrecognized(Value::Number(number)),
            },
            Value::Object(mut map) => match map.remove("$date").or_else(|| map.remove("date")) {
                Some(inner) => RawDate::Wrapped(Box::new(RawDate::from(inner))),
                None => RawDate::Unrecognized(Value::Object(map)),
            },
            other => RawDate::Unrecognized(other),
        }
    }
}

impl From<&str> for RawDate {
    fn from(value: &str) -> Self {
        RawDate::Iso(value.to_string())
    }
}

impl From<String> for RawDate {
    fn from(value: String) -> Self {
        RawDate::Iso(value)
    }
}

impl From<DateTime<Utc>> for RawDate {
    fn from(value: DateTime<Utc>) -> Self {
        RawDate::Native(value)
    }
}

impl From<i64> for RawDate {
    fn from(value: i64) -> Self {
        RawDate::Epoch(value as f64)
    }
}

impl Serialize for RawDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawDate::Iso(text) => serializer.serialize_str(text),
            RawDate::Wrapped(inner) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("date", inner)?;
                map.end()
            }
            RawDate::Native(instant) => {
                serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            RawDate::Epoch(millis) if millis.fract() == 0.0 && millis.abs() <= MAX_EPOCH_MILLIS => {
                serializer.serialize_i64(*millis as i64)
            }
            RawDate::Epoch(millis) => serializer.serialize_f64(*millis),
            RawDate::Unrecognized(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RawDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(RawDate::from)
    }
}

impl fmt::Display for RawDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Wall-clock calendar fields of an instant in a given zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalFields {
    pub year: i32,
    /// 1-12
    pub month: u32,
    /// 1-31
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl LocalFields {
    pub fn from_instant<Tz: TimeZone>(instant: &DateTime<Utc>, zone: &Tz) -> Self {
        let local = instant.with_timezone(zone);
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
        }
    }

    pub fn minute_of_day(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    pub fn same_day(&self, other: &Self) -> bool {
        (self.year, self.month, self.day) == (other.year, other.month, other.day)
    }
}

impl fmt::Display for LocalFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedInstant {
    pub instant: DateTime<Utc>,
    pub local: LocalFields,
}

impl NormalizedInstant {
    pub fn new<Tz: TimeZone>(instant: DateTime<Utc>, zone: &Tz) -> Self {
        Self {
            instant,
            local: LocalFields::from_instant(&instant, zone),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationError {
    pub raw: String,
    pub reason: &'static str,
}

impl fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot normalize reminder date {}: {}", self.raw, self.reason)
    }
}

impl std::error::Error for NormalizationError {}

/// Normalizes against the system's local zone.
pub fn normalize(raw: &RawDate) -> Result<NormalizedInstant, NormalizationError> {
    normalize_in(raw, &chrono::Local)
}

/// Ordered fallback chain, first success wins:
/// unwrap one level, parse strings, accept native instants, coerce to epoch millis,
/// and finally re-parse the value's string coercion.
pub fn normalize_in<Tz: TimeZone>(
    raw: &RawDate,
    zone: &Tz,
) -> Result<NormalizedInstant, NormalizationError> {
    let value = match raw {
        RawDate::Wrapped(inner) => inner.as_ref(),
        other => other,
    };

    let instant = match value {
        RawDate::Iso(text) => parse_text(text, zone).or_else(|| {
            coerce_number(text).and_then(from_epoch_millis)
        }),
        RawDate::Native(instant) => Some(*instant),
        RawDate::Epoch(millis) => from_epoch_millis(*millis),
        RawDate::Wrapped(_) | RawDate::Unrecognized(_) => None,
    }
    .or_else(|| parse_text(&coerce_string(value), zone));

    instant
        .map(|instant| NormalizedInstant::new(instant, zone))
        .ok_or_else(|| NormalizationError {
            raw: raw.to_string(),
            reason: failure_reason(value),
        })
}

fn failure_reason(value: &RawDate) -> &'static str {
    match value {
        RawDate::Iso(text) if text.trim().is_empty() => "empty date string",
        RawDate::Iso(_) => "unparseable date string",
        RawDate::Epoch(_) => "epoch value out of range",
        RawDate::Wrapped(_) => "nested date wrapper",
        RawDate::Native(_) | RawDate::Unrecognized(_) => "unsupported date shape",
    }
}

fn parse_text<Tz: TimeZone>(text: &str, zone: &Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in LOCAL_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return resolve_local(&naive, zone);
        }
    }
    // Date-only forms are UTC midnight.
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn resolve_local<Tz: TimeZone>(naive: &NaiveDateTime, zone: &Tz) -> Option<DateTime<Utc>> {
    let resolved = match zone.from_local_datetime(naive) {
        LocalResult::Single(local) => Some(local),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // Inside a DST gap: move forward past the skipped hour.
        LocalResult::None => zone
            .from_local_datetime(&(*naive + Duration::hours(1)))
            .earliest(),
    };
    resolved.map(|local| local.with_timezone(&Utc))
}

fn coerce_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok()
}

fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64)
}

fn coerce_string(value: &RawDate) -> String {
    match value {
        RawDate::Iso(text) => text.clone(),
        RawDate::Native(instant) => instant.to_rfc3339(),
        RawDate::Epoch(millis) => millis.to_string(),
        RawDate::Wrapped(_) => "[object Object]".to_string(),
        RawDate::Unrecognized(value) => coerce_json_string(value),
    }
}

fn coerce_json_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(coerce_json_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
