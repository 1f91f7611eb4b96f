//! 🧩 Index name templates: `logs-{@timestamp|yyyy.MM.dd}` → `logs-2026.10.19`.
//!
//! Two stages, chained. The template pulls the raw value out of the record; the formatter
//! turns value + pattern into the name fragment. `{field}` without a pattern is the plain
//! scalar. The date formatter understands the `yyyy MM dd HH mm ss` vocabulary because
//! that is what everyone already types into index patterns.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::IndexFormatter;
use crate::error::ConfigError;
use crate::record::{Record, scalar_to_string};
use crate::settings::keys;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { path: String, pattern: Option<String> },
}

/// 🎭 Resolved formatter handle. Built-ins are variants; registered ones ride in `Custom`.
#[derive(Debug, Clone)]
pub enum IndexFormatterHandle {
    Date(DateIndexFormatter),
    Identity,
    Custom {
        name: String,
        formatter: Arc<dyn IndexFormatter>,
    },
}

impl IndexFormatterHandle {
    fn format(&self, pattern: &str, value: &Value) -> Option<String> {
        match self {
            IndexFormatterHandle::Date(date) => date.format(pattern, value),
            IndexFormatterHandle::Identity => scalar_to_string(value),
            IndexFormatterHandle::Custom { formatter, .. } => formatter.format(pattern, value),
        }
    }

    fn name(&self) -> &str {
        match self {
            IndexFormatterHandle::Date(_) => keys::DATE_INDEX_FORMATTER,
            IndexFormatterHandle::Identity => keys::IDENTITY_INDEX_FORMATTER,
            IndexFormatterHandle::Custom { name, .. } => name,
        }
    }
}

/// 📐 A parsed `index` resource, literal or templated.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    source: String,
    segments: Vec<Segment>,
    formatter: IndexFormatterHandle,
}

impl IndexTemplate {
    /// 🔪 Parse `prefix-{field|pattern}-suffix`. Unbalanced braces and empty fields are config errors.
    pub fn parse(source: &str, formatter: IndexFormatterHandle) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            key: keys::RESOURCE_WRITE.to_string(),
            value: source.to_string(),
            expected: "index name template with balanced {field[|pattern]} sections",
        };
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let close = rest[open..].find('}').ok_or_else(invalid)? + open;
            let inner = &rest[open + 1..close];
            if inner.contains('{') {
                return Err(invalid());
            }
            let (path, pattern) = match inner.split_once('|') {
                Some((path, pattern)) => (path.trim(), Some(pattern.trim().to_string())),
                None => (inner.trim(), None),
            };
            if path.is_empty() {
                return Err(invalid());
            }
            segments.push(Segment::Field {
                path: path.to_string(),
                pattern: pattern.filter(|pattern| !pattern.is_empty()),
            });
            rest = &rest[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid());
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
            formatter,
        })
    }

    /// 🎯 Fill the template from one record.
    pub fn resolve(&self, record: &dyn Record) -> Result<String, String> {
        let mut name = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Field { path, pattern } => {
                    let value = record
                        .field(path)
                        .filter(|value| !value.is_null())
                        .ok_or_else(|| format!("cannot find a value for '{{{path}}}' in '{}'", self.source))?;
                    let fragment = match pattern {
                        Some(pattern) => self.formatter.format(pattern, value).ok_or_else(|| {
                            format!(
                                "formatter '{}' could not apply '{pattern}' to {value}",
                                self.formatter.name()
                            )
                        })?,
                        None => scalar_to_string(value)
                            .ok_or_else(|| format!("'{{{path}}}' is {value}, which is not a scalar"))?,
                    };
                    name.push_str(&fragment);
                }
            }
        }
        Ok(name)
    }
}

impl fmt::Display for IndexTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 🗓️ Dates in, formatted fragments out. Accepts RFC 3339 strings, `yyyy-MM-dd[THH:mm:ss]`
/// strings, and epoch milliseconds (numeric or all-digit strings). Everything is rendered in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateIndexFormatter;

impl DateIndexFormatter {
    fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(number) => DateTime::from_timestamp_millis(number.as_i64()?),
            Value::String(text) => {
                let text = text.trim();
                if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
                    return Some(instant.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
                    return Some(naive.and_utc());
                }
                if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                    return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
                }
                if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                    return DateTime::from_timestamp_millis(text.parse().ok()?);
                }
                None
            }
            _ => None,
        }
    }
}

impl IndexFormatter for DateIndexFormatter {
    fn format(&self, pattern: &str, value: &Value) -> Option<String> {
        let instant = Self::parse_instant(value)?;
        Some(instant.format(&to_strftime(pattern)).to_string())
    }
}

/// 🔤 `yyyy.MM.dd` → `%Y.%m.%d`. Unknown letters pass through as literals.
fn to_strftime(pattern: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("SSS", "%3f"),
    ];
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while let Some(c) = rest.chars().next() {
        for (token, replacement) in TOKENS {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = after;
                continue 'outer;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}
