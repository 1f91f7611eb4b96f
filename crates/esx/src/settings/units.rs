//! 📏 Unit parsing: "1mb", "10s", "yes". Humans type these. Computers suffer them.
//!
//! Every parser returns `None` on garbage; the view turns that into a `ConfigError`
//! with the key attached, because a bare "invalid size" at 3am helps nobody.

use std::time::Duration;

const KB: u64 = 1024;

/// 📦 Parse a byte size. Bare numbers are bytes. Suffixes are binary multiples.
pub(crate) fn parse_size(raw: &str) -> Option<u64> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (digits, unit) = split_number(&normalized)?;
    let multiplier = match unit {
        "" | "b" => 1,
        "k" | "kb" => KB,
        "m" | "mb" => KB * KB,
        "g" | "gb" => KB * KB * KB,
        _ => return None,
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// ⏱️ Parse a duration. Bare numbers are milliseconds, because that is what the
/// original knob meant and changing it would surprise exactly one person: the on-call.
pub(crate) fn parse_duration(raw: &str) -> Option<Duration> {
    let normalized = raw.trim().to_ascii_lowercase();
    let (digits, unit) = split_number(&normalized)?;
    let amount = digits.parse::<u64>().ok()?;
    let millis = match unit {
        "" | "ms" => amount,
        "s" => amount.checked_mul(1_000)?,
        "m" => amount.checked_mul(60_000)?,
        "h" => amount.checked_mul(3_600_000)?,
        "d" => amount.checked_mul(86_400_000)?,
        _ => return None,
    };
    Some(Duration::from_millis(millis))
}

/// ✅ Parse a boolean in any of its many costumes.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// 📋 Comma separated list, trimmed, blanks dropped.
pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_number(normalized: &str) -> Option<(&str, &str)> {
    let split_at = normalized
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(normalized.len());
    let (digits, unit) = normalized.split_at(split_at);
    if digits.is_empty() {
        return None;
    }
    Some((digits, unit.trim()))
}
