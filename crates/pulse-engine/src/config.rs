//! Configuration for the aggregation and detection engine

use std::fmt;

use pulse_types::Granularity;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Time-bucket aggregation
    #[serde(default)]
    pub buckets: BucketConfig,

    /// Spike trigger policy and thresholds
    #[serde(default)]
    pub spike: SpikeConfig,

    /// Hysteresis for ending spikes that are still being edited
    #[serde(default)]
    pub hysteresis: HysteresisConfig,

    /// Notification queue
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Periodic reaper
    #[serde(default)]
    pub reaper: ReaperConfig,
}

/// Time-bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket widths maintained in parallel
    #[serde(default = "default_granularities")]
    pub granularities: Vec<Granularity>,

    /// Volume contributed by every edit
    #[serde(default = "default_weight")]
    pub edit_weight: u64,

    /// Volume contributed per changed byte
    #[serde(default = "default_weight")]
    pub byte_weight: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            granularities: default_granularities(),
            edit_weight: 1,
            byte_weight: 1,
        }
    }
}

/// How NORMAL -> SPIKING is decided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Only the weighted score is compared to `weighted_threshold`
    WeightedScore,
    /// Raw bytes, raw edit count or weighted score, whichever crosses first
    #[default]
    AnyCriterion,
}

/// Spike detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpikeConfig {
    #[serde(default)]
    pub policy: TriggerPolicy,

    /// Score above which a spike starts
    #[serde(default = "default_weighted_threshold")]
    pub weighted_threshold: f64,

    /// Raw byte volume above which a spike starts (`any_criterion` only)
    #[serde(default = "default_bytes_threshold")]
    pub bytes_threshold: u64,

    /// Raw edit count above which a spike starts (`any_criterion` only)
    #[serde(default = "default_edits_threshold")]
    pub edits_threshold: u64,

    #[serde(default = "default_weight_bytes")]
    pub weight_bytes: f64,

    #[serde(default = "default_weight_edits")]
    pub weight_edits: f64,

    /// Pseudo byte points credited per edit in the score
    #[serde(default = "default_points_per_edit")]
    pub points_per_edit: f64,

    /// A spike with no edits for this long is ended by the reaper
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            policy: TriggerPolicy::default(),
            weighted_threshold: default_weighted_threshold(),
            bytes_threshold: default_bytes_threshold(),
            edits_threshold: default_edits_threshold(),
            weight_bytes: default_weight_bytes(),
            weight_edits: default_weight_edits(),
            points_per_edit: default_points_per_edit(),
            inactivity_timeout_secs: default_inactivity_timeout(),
        }
    }
}

/// What pushed an entity over the line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerReason {
    Bytes { bytes: u64, threshold: u64 },
    Edits { edits: u64, threshold: u64 },
    Score { score: f64, threshold: f64 },
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Bytes { bytes, threshold } => {
                write!(f, "bytes changed exceeded threshold ({bytes} > {threshold})")
            }
            TriggerReason::Edits { edits, threshold } => {
                write!(f, "edit count exceeded threshold ({edits} > {threshold})")
            }
            TriggerReason::Score { score, threshold } => {
                write!(f, "weighted score exceeded threshold ({score:.1} > {threshold:.1})")
            }
        }
    }
}

impl SpikeConfig {
    /// `W_bytes × bytes + W_edits × (edits × points_per_edit)`
    pub fn score(&self, edits: u64, bytes: u64) -> f64 {
        self.weight_bytes * bytes as f64 + self.weight_edits * (edits as f64 * self.points_per_edit)
    }

    /// Whether the given since-window totals start a spike under the policy.
    pub fn trigger(&self, edits: u64, bytes: u64) -> Option<TriggerReason> {
        if self.policy == TriggerPolicy::AnyCriterion {
            if bytes > self.bytes_threshold {
                return Some(TriggerReason::Bytes {
                    bytes,
                    threshold: self.bytes_threshold,
                });
            }
            if edits > self.edits_threshold {
                return Some(TriggerReason::Edits {
                    edits,
                    threshold: self.edits_threshold,
                });
            }
        }
        let score = self.score(edits, bytes);
        (score > self.weighted_threshold).then_some(TriggerReason::Score {
            score,
            threshold: self.weighted_threshold,
        })
    }

    pub fn inactivity_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.inactivity_timeout_secs.min(i64::MAX as u64) as i64)
    }
}

/// Hysteresis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HysteresisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Edits per observation cycle at or above which a spike counts as sustained
    #[serde(default = "default_hysteresis_threshold")]
    pub threshold: u64,

    /// Consecutive quiet cycles that end a spike
    #[serde(default = "default_cooldown")]
    pub cooldown: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_hysteresis_threshold(),
            cooldown: default_cooldown(),
        }
    }
}

/// Notification dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Pending transitions held before new ones are dropped
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Reaper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval(),
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_granularities() -> Vec<Granularity> {
    Granularity::defaults()
}

fn default_weight() -> u64 {
    1
}

fn default_weighted_threshold() -> f64 {
    4000.0
}

fn default_bytes_threshold() -> u64 {
    4000
}

fn default_edits_threshold() -> u64 {
    5
}

fn default_weight_bytes() -> f64 {
    0.75
}

fn default_weight_edits() -> f64 {
    0.25
}

fn default_points_per_edit() -> f64 {
    500.0
}

fn default_inactivity_timeout() -> u64 {
    30 * 60
}

fn default_hysteresis_threshold() -> u64 {
    3
}

fn default_cooldown() -> u32 {
    10
}

fn default_capacity() -> usize {
    1000
}

fn default_reaper_interval() -> u64 {
    60
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.buckets.granularities.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one bucket granularity is required".into(),
            ));
        }
        let spike = &self.spike;
        for (name, value) in [
            ("weighted_threshold", spike.weighted_threshold),
            ("weight_bytes", spike.weight_bytes),
            ("weight_edits", spike.weight_edits),
            ("points_per_edit", spike.points_per_edit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "spike.{name} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        if spike.inactivity_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "spike.inactivity_timeout_secs must be > 0".into(),
            ));
        }
        if self.hysteresis.enabled && self.hysteresis.cooldown == 0 {
            return Err(EngineError::InvalidConfig(
                "hysteresis.cooldown must be > 0 when hysteresis is enabled".into(),
            ));
        }
        if self.dispatcher.capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "dispatcher.capacity must be > 0".into(),
            ));
        }
        if self.reaper.interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "reaper.interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}
