//! Canonical edit record shared by every engine component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single accepted content edit.
///
/// Produced by [`crate::Normalizer`] from either wire shape and consumed once by
/// the counter store, the bucket aggregator and the spike detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    /// Revision id reported by the source (0 when absent).
    pub revision_id: u64,

    /// Entity key (article title). Never empty.
    pub entity: String,

    /// Event time; drives bucket placement.
    pub timestamp: DateTime<Utc>,

    /// Page length before the edit, in bytes.
    pub length_old: u64,

    /// Page length after the edit, in bytes.
    pub length_new: u64,

    /// Editor name.
    pub actor: String,

    /// Edit was made by an automated account.
    pub bot: bool,

    /// Edit was flagged minor.
    pub minor: bool,

    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub title_url: String,

    #[serde(default)]
    pub notify_url: String,

    #[serde(default)]
    pub server_url: String,
}

impl EditRecord {
    /// Create a record with only the fields the engine needs; the rest default.
    pub fn new(
        entity: impl Into<String>,
        timestamp: DateTime<Utc>,
        length_old: u64,
        length_new: u64,
    ) -> Self {
        Self {
            revision_id: 0,
            entity: entity.into(),
            timestamp,
            length_old,
            length_new,
            actor: String::new(),
            bot: false,
            minor: false,
            comment: String::new(),
            title_url: String::new(),
            notify_url: String::new(),
            server_url: String::new(),
        }
    }

    /// Signed change in page length, saturated to the `i64` range.
    pub fn byte_delta(&self) -> i64 {
        let delta = i128::from(self.length_new) - i128::from(self.length_old);
        i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX })
    }

    /// Absolute change in page length.
    pub fn byte_volume(&self) -> u64 {
        self.length_new.abs_diff(self.length_old)
    }
}
