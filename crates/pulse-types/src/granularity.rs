//! Fixed bucket widths.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid granularity {0:?}: expected <n>s, <n>m, <n>h or <n>d with n > 0")]
pub struct GranularityParseError(pub String);

/// A bucket width in whole seconds.
///
/// Windows are aligned to absolute epoch multiples of the width, so the
/// window an instant falls into never depends on when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Granularity(u32);

impl Granularity {
    pub const ONE_MINUTE: Granularity = Granularity(60);
    pub const FIVE_MINUTES: Granularity = Granularity(300);
    pub const ONE_HOUR: Granularity = Granularity(3_600);
    pub const SIX_HOURS: Granularity = Granularity(21_600);

    /// Width in seconds; `None` for zero.
    pub fn from_secs(secs: u32) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(&self) -> i64 {
        i64::from(self.0)
    }

    /// Start (inclusive) of the window containing `ts`.
    pub fn window_start(&self, ts: DateTime<Utc>) -> i64 {
        ts.timestamp().div_euclid(self.as_secs()) * self.as_secs()
    }

    /// Half-open `[start, end)` window containing `ts`, as UTC instants.
    pub fn window(&self, ts: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.window_start(ts);
        (epoch(start), epoch(start + self.as_secs()))
    }

    /// The default set: 1m, 5m, 1h, 6h.
    pub fn defaults() -> Vec<Granularity> {
        vec![
            Self::ONE_MINUTE,
            Self::FIVE_MINUTES,
            Self::ONE_HOUR,
            Self::SIX_HOURS,
        ]
    }
}

pub(crate) fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs % 86_400 == 0 {
            write!(f, "{}d", secs / 86_400)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else if secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

impl FromStr for Granularity {
    type Err = GranularityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || GranularityParseError(s.to_string());
        if trimmed.len() < 2 {
            return Err(err());
        }
        let (count, unit) = trimmed.split_at(trimmed.len() - 1);
        let count: u32 = count.parse().map_err(|_| err())?;
        let scale = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(err()),
        };
        count
            .checked_mul(scale)
            .and_then(Granularity::from_secs)
            .ok_or_else(err)
    }
}

impl Serialize for Granularity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Granularity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}
