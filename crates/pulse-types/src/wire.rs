//! Inbound wire shapes.
//!
//! Both feeds are decoded into typed structs whose fields go through lenient
//! adapters: a field that is absent, `null` or of the wrong JSON type decodes
//! to its declared default instead of failing the whole record. Only the shape
//! of the envelope itself (a JSON object) is required.

use serde::{Deserialize, Serialize};

/// A raw, not yet validated edit from either feed.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEdit {
    /// One `data:` payload from the live recent-change stream.
    Live(LiveChange),
    /// One element of the historical backfill array.
    Historical(HistoricalEdit),
}

impl From<LiveChange> for RawEdit {
    fn from(change: LiveChange) -> Self {
        RawEdit::Live(change)
    }
}

impl From<HistoricalEdit> for RawEdit {
    fn from(edit: HistoricalEdit) -> Self {
        RawEdit::Historical(edit)
    }
}

/// Timestamp as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Seconds since the Unix epoch.
    Epoch(f64),
    /// ISO-8601 / RFC 3339 text (or a numeric string).
    Text(String),
}

/// Event from the live recent-change stream.
///
/// Field defaults: strings `""`, numbers `0`, flags `false`, timestamp `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LiveChange {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub meta: LiveMeta,

    /// Change type; only `"edit"` is accepted downstream.
    #[serde(default, rename = "type", deserialize_with = "lenient::string")]
    pub kind: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub server_name: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub title_url: String,

    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub id: u64,

    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<RawTimestamp>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub length: LiveLength,

    #[serde(default, deserialize_with = "lenient::string")]
    pub user: String,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub bot: bool,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub minor: bool,

    #[serde(default, deserialize_with = "lenient::string")]
    pub comment: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub notify_url: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub server_url: String,
}

impl LiveChange {
    /// Decode one `data:` payload.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Corpus domain, preferring `meta.domain` over `server_name`.
    pub fn domain(&self) -> &str {
        if self.meta.domain.is_empty() {
            &self.server_name
        } else {
            &self.meta.domain
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LiveMeta {
    #[serde(default, deserialize_with = "lenient::string")]
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LiveLength {
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub old: u64,

    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub new: u64,
}

/// Element of the historical backfill response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEdit {
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub id: u64,

    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub title_url: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub comment: String,

    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub timestamp: Option<RawTimestamp>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub user: String,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub bot: bool,

    #[serde(default, deserialize_with = "lenient::string")]
    pub notify_url: String,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub minor: bool,

    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub length_old: u64,

    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub length_new: u64,

    #[serde(default, deserialize_with = "lenient::string")]
    pub server_url: String,
}

/// Decode a backfill response body, tolerating malformed elements.
///
/// Elements that are not JSON objects are skipped; the count of skipped
/// elements is returned alongside the decoded edits.
pub fn decode_historical(body: &[u8]) -> Result<(Vec<HistoricalEdit>, usize), serde_json::Error> {
    let items: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    let mut skipped = 0;
    let edits = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(edit) => Some(edit),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    Ok((edits, skipped))
}

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::RawTimestamp;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => String::new(),
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
    }

    pub fn unsigned<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0),
            _ => 0,
        })
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<RawTimestamp>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().map(RawTimestamp::Epoch),
            Value::String(s) if !s.trim().is_empty() => Some(RawTimestamp::Text(s)),
            _ => None,
        })
    }

    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(serde_json::from_value(Value::deserialize(d)?).unwrap_or_default())
    }
}
