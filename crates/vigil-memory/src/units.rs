//! Human-readable sizes and durations.
//!
//! Configuration values arrive as strings (`"500MB"`, `"00:00:05"`); log
//! output goes the other way. These helpers are pure so they can be unit
//! tested without a host.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSizeError {
    #[error("empty size string")]
    Empty,
    #[error("invalid numeric value `{0}`")]
    InvalidNumber(String),
    #[error("unknown size unit `{0}`")]
    UnknownUnit(String),
    #[error("size `{0}` does not fit in 64 bits")]
    Overflow(String),
}

/// Parse a human-readable byte size such as `"500MB"`, `"1.5 GiB"` or a raw
/// byte count. Units are 1024-based; `KB` and `KiB` are treated the same.
pub fn parse_byte_size(input: &str) -> Result<u64, ParseSizeError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(ParseSizeError::Empty);
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => return Err(ParseSizeError::UnknownUnit(other.to_string())),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| ParseSizeError::InvalidNumber(number.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ParseSizeError::InvalidNumber(number.to_string()));
    }

    let bytes = value * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(ParseSizeError::Overflow(raw.to_string()));
    }
    Ok(bytes.round() as u64)
}

/// Format a byte count for log output: `512 B`, `1.5 MB`, `2.0 GB`.
pub fn format_byte_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration `{0}`")]
    Invalid(String),
    #[error("duration `{0}` is out of range")]
    OutOfRange(String),
}

/// Parse a duration given either as a clock string (`"00:00:05"`,
/// `"1.02:30:00"` for one day, two and a half hours) or as a suffixed
/// shorthand (`"250ms"`, `"5s"`, `"2m"`, `"1h"`, `"1d"`). A bare number is
/// taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(ParseDurationError::Empty);
    }
    if raw.contains(':') {
        parse_clock_duration(raw)
    } else {
        parse_suffixed_duration(raw)
    }
}

fn parse_clock_duration(raw: &str) -> Result<Duration, ParseDurationError> {
    let invalid = || ParseDurationError::Invalid(raw.to_string());

    // An optional day count is separated from the clock part by a dot:
    // `d.hh:mm:ss`. A dot inside the seconds field is a fraction, not days.
    let (days, clock) = match raw.split_once('.') {
        Some((days, rest)) if rest.contains(':') && !days.contains(':') => {
            (days.parse::<u64>().map_err(|_| invalid())?, rest)
        }
        _ => (0, raw),
    };

    let mut fields = clock.split(':');
    let hours = fields.next().ok_or_else(invalid)?;
    let minutes = fields.next().ok_or_else(invalid)?;
    let seconds = fields.next().unwrap_or("0");
    if fields.next().is_some() {
        return Err(invalid());
    }

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let whole = days
        .checked_mul(86_400)
        .and_then(|d| hours.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|s| s.checked_add(minutes * 60))
        .ok_or_else(|| ParseDurationError::OutOfRange(raw.to_string()))?;
    Ok(Duration::from_secs(whole) + Duration::from_secs_f64(seconds))
}

fn parse_suffixed_duration(raw: &str) -> Result<Duration, ParseDurationError> {
    let invalid = || ParseDurationError::Invalid(raw.to_string());

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }

    let seconds = match unit.trim() {
        "ms" => value / 1_000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        "d" => value * 86_400.0,
        _ => return Err(invalid()),
    };
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ParseDurationError::OutOfRange(raw.to_string()))
}
