//! Compact duration strings: a plain integer followed by one unit letter.

use crate::error::{ReplayError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^([0-9]+)(d|h|m)$").expect("valid duration pattern");
}

/// Parses `<N>d`, `<N>h` or `<N>m` into a [`Duration`].
///
/// Composite forms such as `1d2h`, other units and the empty string are rejected.
pub fn parse_duration_string(input: &str) -> Result<Duration> {
    let caps = DURATION_RE.captures(input).ok_or_else(|| {
        ReplayError::config(format!(
            "invalid duration '{}': expected a number followed by d, h or m",
            input
        ))
    })?;

    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| ReplayError::config(format!("duration amount out of range: {}", input)))?;
    let unit_secs = match &caps[2] {
        "d" => 86_400,
        "h" => 3_600,
        _ => 60,
    };

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ReplayError::config(format!("duration out of range: {}", input)))
}

/// Like [`parse_duration_string`] but maps an empty string to `None`.
pub fn parse_optional_duration(input: &str) -> Result<Option<Duration>> {
    if input.is_empty() {
        return Ok(None);
    }
    parse_duration_string(input).map(Some)
}

/// Converts a duration to whole seconds as used by series timestamps.
pub(crate) fn as_offset_secs(duration: Duration) -> Result<i64> {
    i64::try_from(duration.as_secs())
        .map_err(|_| ReplayError::config(format!("duration too large: {:?}", duration)))
}
