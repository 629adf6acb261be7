//! Parsing of per-origin token lifetimes (`jwt_expiry_in`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Raw `jwt_expiry_in` as written in a manifest.
///
/// Either an integer number of seconds or a duration string such as `"3h"`,
/// `"90m"` or `"1h30m"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawExpiry {
    /// Whole seconds.
    Seconds(u64),
    /// Duration string.
    Text(String),
}

impl RawExpiry {
    /// Resolve to a positive duration.
    pub fn to_duration(&self) -> PolicyResult<Duration> {
        let duration = match self {
            Self::Seconds(secs) => Duration::from_secs(*secs),
            Self::Text(text) => parse_duration(text)?,
        };
        if duration.is_zero() {
            return Err(PolicyError::invalid_expiry(
                self.to_string(),
                "must be greater than zero",
            ));
        }
        Ok(duration)
    }
}

impl std::fmt::Display for RawExpiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds(secs) => write!(f, "{secs}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Parse `ms`/`s`/`m`/`h`/`d` segments, or bare seconds.
pub fn parse_duration(s: &str) -> PolicyResult<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(PolicyError::invalid_expiry(s, "empty duration"));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(PolicyError::invalid_expiry(s, "expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| PolicyError::invalid_expiry(s, "number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        let segment = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "d" => Duration::from_secs(value.saturating_mul(86_400)),
            "" => return Err(PolicyError::invalid_expiry(s, "missing unit")),
            other => {
                return Err(PolicyError::invalid_expiry(
                    s,
                    format!("unknown unit {other:?}"),
                ))
            }
        };
        total = total.saturating_add(segment);
        rest = &rest[unit_len..];
    }
    Ok(total)
}
