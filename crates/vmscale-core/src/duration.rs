//! Duration strings used in `vmscale.toml` ("500ms", "5s", "2m", "1h", "30").

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration: {0}")]
    Invalid(String),
}

/// Parse a duration string. A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let (digits, unit_secs, millis) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1, true)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1, false)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60, false)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600, false)
    } else {
        (s, 1, false)
    };

    let invalid = || DurationError::Invalid(s.to_string());
    let n = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    if millis {
        return Ok(Duration::from_millis(n));
    }
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
