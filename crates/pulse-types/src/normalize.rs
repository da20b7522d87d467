//! Validation and translation of raw wire edits into [`EditRecord`]s.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::edit::EditRecord;
use crate::wire::{HistoricalEdit, LiveChange, RawEdit, RawTimestamp};

/// Reasons a raw edit is not forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("not a content edit: type {0:?}")]
    NotAnEdit(String),

    #[error("domain {found:?} does not match monitored corpus {expected:?}")]
    ForeignDomain { expected: String, found: String },

    #[error("missing entity title")]
    MissingEntity,

    #[error("entity {0:?} is outside the monitored namespace")]
    OutsideNamespace(String),

    #[error("missing or unparseable timestamp")]
    InvalidTimestamp,
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Corpus domain, e.g. `en.wikipedia.org`.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Titles containing this character belong to a non-article namespace.
    #[serde(default = "default_namespace_separator")]
    pub namespace_separator: char,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            namespace_separator: default_namespace_separator(),
        }
    }
}

fn default_domain() -> String {
    "en.wikipedia.org".to_string()
}

fn default_namespace_separator() -> char {
    ':'
}

/// Stateless translator from [`RawEdit`] to [`EditRecord`].
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Validate and translate one raw edit.
    pub fn normalize(&self, raw: RawEdit) -> Result<EditRecord, Rejection> {
        match raw {
            RawEdit::Live(change) => self.normalize_live(change),
            RawEdit::Historical(edit) => self.normalize_historical(edit),
        }
    }

    fn normalize_live(&self, change: LiveChange) -> Result<EditRecord, Rejection> {
        if change.kind != "edit" {
            return Err(Rejection::NotAnEdit(change.kind));
        }
        if change.domain() != self.config.domain {
            return Err(Rejection::ForeignDomain {
                expected: self.config.domain.clone(),
                found: change.domain().to_string(),
            });
        }
        self.check_entity(&change.title)?;
        let timestamp = parse_timestamp(change.timestamp.as_ref())?;

        Ok(EditRecord {
            revision_id: change.id,
            entity: change.title,
            timestamp,
            length_old: change.length.old,
            length_new: change.length.new,
            actor: change.user,
            bot: change.bot,
            minor: change.minor,
            comment: change.comment,
            title_url: change.title_url,
            notify_url: change.notify_url,
            server_url: change.server_url,
        })
    }

    fn normalize_historical(&self, edit: HistoricalEdit) -> Result<EditRecord, Rejection> {
        if !edit.server_url.is_empty() && !server_matches(&edit.server_url, &self.config.domain) {
            return Err(Rejection::ForeignDomain {
                expected: self.config.domain.clone(),
                found: edit.server_url,
            });
        }
        self.check_entity(&edit.title)?;
        let timestamp = parse_timestamp(edit.timestamp.as_ref())?;

        Ok(EditRecord {
            revision_id: edit.id,
            entity: edit.title,
            timestamp,
            length_old: edit.length_old,
            length_new: edit.length_new,
            actor: edit.user,
            bot: edit.bot,
            minor: edit.minor,
            comment: edit.comment,
            title_url: edit.title_url,
            notify_url: edit.notify_url,
            server_url: edit.server_url,
        })
    }

    fn check_entity(&self, title: &str) -> Result<(), Rejection> {
        if title.trim().is_empty() {
            return Err(Rejection::MissingEntity);
        }
        if title.contains(self.config.namespace_separator) {
            return Err(Rejection::OutsideNamespace(title.to_string()));
        }
        Ok(())
    }
}

/// `https://en.wikipedia.org` matches domain `en.wikipedia.org`.
fn server_matches(server_url: &str, domain: &str) -> bool {
    let host = server_url
        .split("://")
        .last()
        .unwrap_or(server_url)
        .split('/')
        .next()
        .unwrap_or_default();
    host.eq_ignore_ascii_case(domain)
}

/// Parse either timestamp form into UTC.
pub fn parse_timestamp(raw: Option<&RawTimestamp>) -> Result<DateTime<Utc>, Rejection> {
    match raw {
        Some(RawTimestamp::Epoch(secs)) => from_epoch(*secs),
        Some(RawTimestamp::Text(text)) => parse_text(text.trim()),
        None => Err(Rejection::InvalidTimestamp),
    }
}

fn from_epoch(secs: f64) -> Result<DateTime<Utc>, Rejection> {
    if !secs.is_finite() {
        return Err(Rejection::InvalidTimestamp);
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    Utc.timestamp_opt(whole as i64, nanos)
        .single()
        .ok_or(Rejection::InvalidTimestamp)
}

fn parse_text(text: &str) -> Result<DateTime<Utc>, Rejection> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    match text.parse::<f64>() {
        Ok(secs) => from_epoch(secs),
        Err(_) => Err(Rejection::InvalidTimestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(title: &str) -> LiveChange {
        LiveChange::from_json(&format!(
            r#"{{"meta": {{"domain": "en.wikipedia.org"}}, "type": "edit", "title": "{title}",
                "timestamp": 1700000000, "length": {{"old": 10, "new": 25}}, "user": "u"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn accepts_article_edit() {
        let record = Normalizer::default().normalize(live("Foo").into()).unwrap();
        assert_eq!(record.entity, "Foo");
        assert_eq!(record.byte_volume(), 15);
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rejects_namespaced_titles() {
        let err = Normalizer::default()
            .normalize(live("Talk:Foo").into())
            .unwrap_err();
        assert_eq!(err, Rejection::OutsideNamespace("Talk:Foo".into()));
    }

    #[test]
    fn rejects_missing_title() {
        let err = Normalizer::default().normalize(live("").into()).unwrap_err();
        assert_eq!(err, Rejection::MissingEntity);
    }

    #[test]
    fn rejects_non_edit_and_foreign_domain() {
        let mut change = live("Foo");
        change.kind = "log".into();
        assert!(matches!(
            Normalizer::default().normalize(change.into()),
            Err(Rejection::NotAnEdit(_))
        ));

        let mut change = live("Foo");
        change.meta.domain = "de.wikipedia.org".into();
        assert!(matches!(
            Normalizer::default().normalize(change.into()),
            Err(Rejection::ForeignDomain { .. })
        ));
    }

    #[test]
    fn historical_checks_server_url_only_when_present() {
        let normalizer = Normalizer::default();
        let mut edit = HistoricalEdit {
            title: "Foo".into(),
            timestamp: Some(RawTimestamp::Text("2024-03-01T12:00:00Z".into())),
            ..Default::default()
        };
        assert!(normalizer.normalize(edit.clone().into()).is_ok());

        edit.server_url = "https://en.wikipedia.org".into();
        assert!(normalizer.normalize(edit.clone().into()).is_ok());

        edit.server_url = "https://fr.wikipedia.org".into();
        assert!(normalizer.normalize(edit.into()).is_err());
    }

    #[test]
    fn timestamp_forms() {
        let epoch = parse_timestamp(Some(&RawTimestamp::Epoch(90.5))).unwrap();
        assert_eq!(epoch.timestamp(), 90);
        assert_eq!(epoch.timestamp_subsec_millis(), 500);

        let iso = parse_timestamp(Some(&RawTimestamp::Text("2024-01-01T00:01:00.000Z".into())))
            .unwrap();
        assert_eq!(iso.timestamp(), 1_704_067_260);

        let naive = parse_timestamp(Some(&RawTimestamp::Text("2024-01-01 00:01:00".into())))
            .unwrap();
        assert_eq!(naive, iso);

        let numeric = parse_timestamp(Some(&RawTimestamp::Text("60".into()))).unwrap();
        assert_eq!(numeric.timestamp(), 60);

        assert_eq!(parse_timestamp(None), Err(Rejection::InvalidTimestamp));
        assert_eq!(
            parse_timestamp(Some(&RawTimestamp::Text("yesterday".into()))),
            Err(Rejection::InvalidTimestamp)
        );
    }
}
