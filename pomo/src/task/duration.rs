// Go-style duration strings: "25m", "1h30m", "90s", "1.5h", "250ms"

use crate::error::{PomoError, Result};
use std::time::Duration;

/// Longest duration accepted anywhere: 100 years
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Parse a duration such as `25m` or `1h30m`
///
/// Accepts a sequence of `<number><unit>` pairs where unit is one of
/// `ms`, `s`, `m`, `h`. Numbers may carry a fractional part. Zero, empty
/// and durations above [`MAX_DURATION`] are rejected.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PomoError::invalid("empty duration"));
    }

    let mut total_ms: f64 = 0.0;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(PomoError::invalid(format!(
                "invalid duration '{}': expected a number",
                input
            )));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| PomoError::invalid(format!("invalid duration '{}'", input)))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_ms = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "" => {
                return Err(PomoError::invalid(format!(
                    "invalid duration '{}': missing unit",
                    input
                )))
            }
            unit => {
                return Err(PomoError::invalid(format!(
                    "invalid duration '{}': unknown unit '{}'",
                    input, unit
                )))
            }
        };
        rest = &rest[unit_len..];
        total_ms += number * unit_ms;
    }

    if total_ms < 1.0 {
        return Err(PomoError::invalid(format!(
            "duration '{}' must be positive",
            input
        )));
    }

    if total_ms > MAX_DURATION.as_millis() as f64 {
        return Err(PomoError::invalid(format!(
            "duration '{}' is too long (at most {})",
            input,
            format_duration(MAX_DURATION)
        )));
    }

    Ok(Duration::from_millis(total_ms.round() as u64))
}

/// Format a duration compactly, e.g. `1h30m`, `25m`, `45s`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}
