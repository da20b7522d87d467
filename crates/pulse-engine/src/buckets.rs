//! Multi-resolution time buckets.
//!
//! One series per configured granularity, each behind its own reader/writer
//! lock. A series maps an epoch-aligned window start to the per-entity volume
//! accumulated in that window. Placement depends only on the edit timestamp,
//! so late historical edits land in their own window.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pulse_types::{EditRecord, Granularity};
use serde::Serialize;
use tracing::debug;

use crate::config::BucketConfig;

/// Activity of one entity within one window of one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub granularity: Granularity,
    /// Inclusive.
    pub start_time: DateTime<Utc>,
    /// Exclusive.
    pub end_time: DateTime<Utc>,
    pub entity: String,
    pub volume: u64,
}

type Series = BTreeMap<i64, HashMap<String, u64>>;

pub struct BucketAggregator {
    edit_weight: u64,
    byte_weight: u64,
    series: BTreeMap<Granularity, RwLock<Series>>,
}

impl BucketAggregator {
    pub fn new(config: &BucketConfig) -> Self {
        let series = config
            .granularities
            .iter()
            .map(|g| (*g, RwLock::new(Series::new())))
            .collect();
        Self {
            edit_weight: config.edit_weight,
            byte_weight: config.byte_weight,
            series,
        }
    }

    /// `edit_weight + byte_weight × |Δbytes|`
    pub fn contribution(&self, edit: &EditRecord) -> u64 {
        self.edit_weight
            .saturating_add(self.byte_weight.saturating_mul(edit.byte_volume()))
    }

    /// Add one edit to its window in every granularity. Returns the volume added
    /// to each bucket.
    pub fn ingest(&self, edit: &EditRecord) -> u64 {
        let volume = self.contribution(edit);
        for (granularity, series) in &self.series {
            let start = granularity.window_start(edit.timestamp);
            let mut series = series.write();
            let window = series.entry(start).or_default();
            match window.get_mut(&edit.entity) {
                Some(total) => *total = total.saturating_add(volume),
                None => {
                    window.insert(edit.entity.clone(), volume);
                }
            }
        }
        debug!(entity = %edit.entity, volume, "Bucketed edit");
        volume
    }

    /// Buckets for `granularity`, window start ascending, then volume descending
    /// (entity name breaks ties). `k` keeps the top `k` entities of each window;
    /// `None` keeps all. An unconfigured granularity yields an empty list.
    pub fn top_entities(&self, granularity: Granularity, k: Option<usize>) -> Vec<TimeBucket> {
        let Some(series) = self.series.get(&granularity) else {
            return Vec::new();
        };
        let series = series.read();

        let mut buckets = Vec::new();
        for (start, window) in series.iter() {
            let mut rows: Vec<(&String, &u64)> = window.iter().collect();
            rows.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));
            let (start_time, end_time) = granularity.window(epoch(*start));
            buckets.extend(
                rows.into_iter()
                    .take(k.unwrap_or(usize::MAX))
                    .map(|(entity, volume)| TimeBucket {
                        granularity,
                        start_time,
                        end_time,
                        entity: entity.clone(),
                        volume: *volume,
                    }),
            );
        }
        buckets
    }

    /// Same as [`Self::top_entities`] with the granularity given as a label
    /// (`"5m"`). Unparseable labels yield an empty list.
    pub fn top_entities_by_label(&self, label: &str, k: Option<usize>) -> Vec<TimeBucket> {
        match label.parse::<Granularity>() {
            Ok(granularity) => self.top_entities(granularity, k),
            Err(_) => Vec::new(),
        }
    }

    /// Volume of the bucket containing `ts` for `entity`, if one exists.
    pub fn volume_at(&self, granularity: Granularity, ts: DateTime<Utc>, entity: &str) -> Option<u64> {
        let series = self.series.get(&granularity)?.read();
        series
            .get(&granularity.window_start(ts))
            .and_then(|window| window.get(entity))
            .copied()
    }

    /// Number of (window, entity) buckets held for `granularity`.
    pub fn bucket_count(&self, granularity: Granularity) -> usize {
        self.series
            .get(&granularity)
            .map(|series| series.read().values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn granularities(&self) -> Vec<Granularity> {
        self.series.keys().copied().collect()
    }
}

fn epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
