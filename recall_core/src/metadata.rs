//! Card header values and the permissive parsers for scheduling fields.
//!
//! Headers are free-form YAML, so any key may hold any shape. They are
//! decoded into [`MetaValue`] and the fields the core cares about are
//! interpreted by dedicated parsers that accept the legacy spellings.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Recognized header value shapes
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<MetaValue>),
    Map(Vec<(String, MetaValue)>),
}

impl From<serde_yaml::Value> for MetaValue {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value;

        match value {
            Value::Null => MetaValue::Null,
            Value::Bool(b) => MetaValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Int(i),
                None => MetaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => MetaValue::Str(s),
            Value::Sequence(items) => {
                MetaValue::List(items.into_iter().map(MetaValue::from).collect())
            }
            Value::Mapping(map) => MetaValue::Map(
                map.into_iter()
                    .map(|(k, v)| (MetaValue::from(k).to_key(), MetaValue::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => MetaValue::from(tagged.value),
        }
    }
}

impl MetaValue {
    fn to_key(&self) -> String {
        match self {
            MetaValue::Str(s) => s.clone(),
            MetaValue::Int(i) => i.to_string(),
            MetaValue::Float(f) => f.to_string(),
            MetaValue::Bool(b) => b.to_string(),
            MetaValue::Null => "null".into(),
            other => format!("{:?}", other),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Decoded header block, in document order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    entries: Vec<(String, MetaValue)>,
}

impl Header {
    /// Parse YAML header text. An empty block is an empty header.
    pub fn parse(text: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        match MetaValue::from(value) {
            MetaValue::Null => Ok(Self::default()),
            MetaValue::Map(entries) => Ok(Self { entries }),
            other => Err(format!("header is not a key/value block: {:?}", other)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// Format used when writing `last_reviewed`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a date or timestamp in any accepted textual form.
///
/// Forms are tried in order; bare dates and naive date-times are UTC.
pub fn parse_date_text(text: &str) -> Option<DateTime<FixedOffset>> {
    let s = text.trim();
    let utc = |naive: NaiveDateTime| Utc.from_utc_datetime(&naive).fixed_offset();

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(utc(naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(utc(naive));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }
    for format in ["%B %d, %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(utc);
        }
    }
    None
}

fn is_blank_or_null(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s == "~" || s.eq_ignore_ascii_case("null")
}

/// Parse a `last_reviewed`/`created` value. `Ok(None)` means absent.
pub fn parse_timestamp(value: &MetaValue) -> Result<Option<DateTime<FixedOffset>>, String> {
    match value {
        MetaValue::Null => Ok(None),
        MetaValue::Int(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .map(|dt| Some(dt.fixed_offset()))
            .ok_or_else(|| format!("timestamp {} out of range", secs)),
        MetaValue::Float(secs) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            Utc.timestamp_opt(whole as i64, nanos)
                .single()
                .map(|dt| Some(dt.fixed_offset()))
                .ok_or_else(|| format!("timestamp {} out of range", secs))
        }
        MetaValue::Str(s) if is_blank_or_null(s) => Ok(None),
        MetaValue::Str(s) => parse_date_text(s)
            .map(Some)
            .ok_or_else(|| format!("unrecognized date {:?}", s)),
        other => Err(format!("expected a date, got {:?}", other)),
    }
}

/// Parse a non-negative whole number (`review_interval`, `difficulty`).
///
/// Integers, integer strings and floats (truncated) are accepted.
pub fn parse_count(value: &MetaValue) -> Result<Option<i64>, String> {
    match value {
        MetaValue::Null => Ok(None),
        MetaValue::Int(i) => Ok(Some(*i)),
        MetaValue::Float(f) if f.is_finite() => Ok(Some(f.trunc() as i64)),
        MetaValue::Str(s) if is_blank_or_null(s) => Ok(None),
        MetaValue::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("expected an integer, got {:?}", s)),
        other => Err(format!("expected an integer, got {:?}", other)),
    }
}

/// Collect tags from a list or a comma-separated string
pub fn parse_tags(value: &MetaValue) -> Vec<String> {
    match value {
        MetaValue::List(items) => items
            .iter()
            .filter(|item| !matches!(item, MetaValue::Null))
            .map(|item| item.to_key().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
        MetaValue::Str(s) => s
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}
