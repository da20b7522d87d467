//! Per-entity spike lifecycle.
//!
//! ```text
//!            score/threshold crossed
//!   NORMAL ───────────────────────────► SPIKING ──┐ edit: re-emit (active)
//!     ▲                                    │  ◄───┘
//!     │  inactivity timeout (reaper)       │
//!     └──── cooldown quiet cycles ◄────────┘
//! ```
//!
//! Every state change for one entity happens inside a single store mutation,
//! so an edit and a reaper sweep for the same entity never interleave. The
//! sweep re-checks inactivity under that lock: an edit that got there first
//! keeps the spike alive.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_types::{EditRecord, SpikePhase, SpikeTransition, TransitionCause};
use serde::Serialize;
use tracing::info;

use crate::config::{HysteresisConfig, SpikeConfig, TriggerReason};
use crate::store::{ShardedStore, StateStore};

/// Detector state for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpikeState {
    pub phase: SpikePhase,
    /// Edits since the current measurement window began.
    pub edits: u64,
    /// Byte volume since the current measurement window began.
    pub bytes: u64,
    pub last_edit: Option<DateTime<Utc>>,
    /// Set only while spiking.
    pub spike_started: Option<DateTime<Utc>>,
    /// Consecutive observation cycles below the hysteresis threshold.
    pub cooldown_counter: u32,
    /// `edits` as seen by the previous observation cycle.
    pub edits_at_last_cycle: u64,
}

impl SpikeState {
    pub fn is_spiking(&self) -> bool {
        self.phase == SpikePhase::Spiking
    }

    fn transition(&self, entity: &str, cause: TransitionCause) -> SpikeTransition {
        let last_edit = self.last_edit.unwrap_or_default();
        SpikeTransition {
            entity: entity.to_string(),
            phase: self.phase,
            cause,
            start_time: self.spike_started.unwrap_or(last_edit),
            last_edit_time: last_edit,
            total_edits: self.edits,
            total_bytes: self.bytes,
            active: self.is_spiking(),
        }
    }

    /// SPIKING -> NORMAL. The event reports the finished spike's totals; the
    /// measurement window then restarts from zero.
    fn end(&mut self, entity: &str, cause: TransitionCause) -> SpikeTransition {
        self.phase = SpikePhase::Normal;
        let transition = self.transition(entity, cause);
        self.edits = 0;
        self.bytes = 0;
        self.spike_started = None;
        self.cooldown_counter = 0;
        self.edits_at_last_cycle = 0;
        transition
    }
}

/// Snapshot of a currently active spike.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSpike {
    pub entity: String,
    pub start_time: DateTime<Utc>,
    pub last_edit_time: DateTime<Utc>,
    pub total_edits: u64,
    pub total_bytes: u64,
}

pub struct SpikeDetector {
    spike: SpikeConfig,
    hysteresis: HysteresisConfig,
    states: Arc<dyn StateStore<SpikeState>>,
}

impl SpikeDetector {
    /// Detector backed by a sharded per-entity store.
    pub fn new(spike: SpikeConfig, hysteresis: HysteresisConfig) -> Self {
        Self::with_store(spike, hysteresis, Arc::new(ShardedStore::<SpikeState>::new()))
    }

    pub fn with_store(
        spike: SpikeConfig,
        hysteresis: HysteresisConfig,
        states: Arc<dyn StateStore<SpikeState>>,
    ) -> Self {
        Self {
            spike,
            hysteresis,
            states,
        }
    }

    pub fn config(&self) -> &SpikeConfig {
        &self.spike
    }

    /// Apply one edit. Returns the event to notify, if any: a start when the
    /// entity crosses the trigger, an update for every edit while spiking.
    pub fn observe_edit(&self, edit: &EditRecord) -> Option<SpikeTransition> {
        let mut emitted: Option<(SpikeTransition, Option<TriggerReason>)> = None;

        self.states.upsert(&edit.entity, &mut |state| {
            state.edits = state.edits.saturating_add(1);
            state.bytes = state.bytes.saturating_add(edit.byte_volume());
            state.last_edit = Some(match state.last_edit {
                Some(prev) if prev > edit.timestamp => prev,
                _ => edit.timestamp,
            });

            if state.is_spiking() {
                emitted = Some((state.transition(&edit.entity, TransitionCause::Updated), None));
            } else if let Some(reason) = self.spike.trigger(state.edits, state.bytes) {
                state.phase = SpikePhase::Spiking;
                state.spike_started = Some(edit.timestamp);
                state.cooldown_counter = 0;
                state.edits_at_last_cycle = state.edits;
                emitted = Some((
                    state.transition(&edit.entity, TransitionCause::Started),
                    Some(reason),
                ));
            }
        });

        let (transition, reason) = emitted?;
        if let Some(reason) = reason {
            info!(
                entity = %transition.entity,
                score = self.spike.score(transition.total_edits, transition.total_bytes),
                last_edit = %transition.last_edit_time,
                "Spike started: {reason}"
            );
        }
        Some(transition)
    }

    /// End every spike whose last edit is older than the inactivity timeout.
    pub fn expire_inactive(&self, now: DateTime<Utc>, cause: TransitionCause) -> Vec<SpikeTransition> {
        let timeout = self.spike.inactivity_timeout();
        let stale = |state: &SpikeState| -> bool {
            state.is_spiking()
                && state
                    .last_edit
                    .map_or(true, |last| now.signed_duration_since(last) > timeout)
        };

        let mut ended = Vec::new();
        for entity in self.states.keys_matching(&stale) {
            let mut transition = None;
            self.states.modify(&entity, &mut |state| {
                // An edit may have landed since the scan.
                if stale(state) {
                    transition = Some(state.end(&entity, cause));
                }
            });
            if let Some(transition) = transition {
                info!(
                    entity = %transition.entity,
                    cause = ?cause,
                    idle_secs = now.signed_duration_since(transition.last_edit_time).num_seconds(),
                    "Spike ended after inactivity"
                );
                ended.push(transition);
            }
        }
        ended
    }

    /// Run one hysteresis observation cycle over all spiking entities.
    ///
    /// A cycle that saw some edits, but fewer than the threshold, advances the
    /// entity's cooldown counter; reaching `cooldown` ends the spike. A busy
    /// cycle resets the counter. A cycle with no edits at all leaves it alone:
    /// idle spikes are ended by [`Self::expire_inactive`] only. No-op when
    /// hysteresis is disabled.
    pub fn observe_cycle(&self) -> Vec<SpikeTransition> {
        if !self.hysteresis.enabled {
            return Vec::new();
        }
        let threshold = self.hysteresis.threshold;
        let cooldown = self.hysteresis.cooldown;

        let mut ended = Vec::new();
        for entity in self.states.keys_matching(&SpikeState::is_spiking) {
            let mut transition = None;
            self.states.modify(&entity, &mut |state| {
                if !state.is_spiking() {
                    return;
                }
                let delta = state.edits.saturating_sub(state.edits_at_last_cycle);
                state.edits_at_last_cycle = state.edits;
                if delta == 0 {
                    return;
                }
                if delta < threshold {
                    state.cooldown_counter += 1;
                    if state.cooldown_counter >= cooldown {
                        transition = Some(state.end(&entity, TransitionCause::Cooldown));
                    }
                } else {
                    state.cooldown_counter = 0;
                }
            });
            if let Some(transition) = transition {
                info!(
                    entity = %transition.entity,
                    cycles = cooldown,
                    "Spike ended after cooldown"
                );
                ended.push(transition);
            }
        }
        ended
    }

    pub fn is_spiking(&self, entity: &str) -> bool {
        self.states
            .get(entity)
            .map_or(false, |state| state.is_spiking())
    }

    pub fn state(&self, entity: &str) -> Option<SpikeState> {
        self.states.get(entity)
    }

    /// Currently spiking entities, most recently edited first.
    pub fn active_spikes(&self) -> Vec<ActiveSpike> {
        let mut active: Vec<ActiveSpike> = self
            .states
            .snapshot()
            .into_iter()
            .filter(|(_, state)| state.is_spiking())
            .map(|(entity, state)| {
                let last_edit = state.last_edit.unwrap_or_default();
                ActiveSpike {
                    entity,
                    start_time: state.spike_started.unwrap_or(last_edit),
                    last_edit_time: last_edit,
                    total_edits: state.edits,
                    total_bytes: state.bytes,
                }
            })
            .collect();
        active.sort_by(|a, b| {
            b.last_edit_time
                .cmp(&a.last_edit_time)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        active
    }

    /// Entities with detector state.
    pub fn tracked_entities(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerPolicy;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn edit(entity: &str, secs: i64, bytes: u64) -> EditRecord {
        EditRecord::new(entity, at(secs), 0, bytes)
    }

    fn detector() -> SpikeDetector {
        SpikeDetector::new(
            SpikeConfig::default(),
            HysteresisConfig {
                enabled: true,
                threshold: 2,
                cooldown: 3,
            },
        )
    }

    #[test]
    fn starts_once_then_updates() {
        let detector = detector();
        assert!(detector.observe_edit(&edit("Foo", 0, 10)).is_none());
        assert!(detector.observe_edit(&edit("Foo", 30, 20)).is_none());

        let start = detector.observe_edit(&edit("Foo", 90, 5000)).unwrap();
        assert_eq!(start.cause, TransitionCause::Started);
        assert!(start.active);
        assert_eq!(start.start_time, at(90));
        assert_eq!(start.total_edits, 3);
        assert_eq!(start.total_bytes, 5030);

        let update = detector.observe_edit(&edit("Foo", 100, 1)).unwrap();
        assert_eq!(update.cause, TransitionCause::Updated);
        assert!(update.active);
        assert_eq!(update.start_time, at(90));
        assert_eq!(update.last_edit_time, at(100));
        assert_eq!(update.total_edits, 4);
        assert!(detector.is_spiking("Foo"));
    }

    #[test]
    fn weighted_only_policy_ignores_raw_edit_count() {
        let detector = SpikeDetector::new(
            SpikeConfig {
                policy: TriggerPolicy::WeightedScore,
                ..SpikeConfig::default()
            },
            HysteresisConfig::default(),
        );
        for i in 0..6 {
            assert!(detector.observe_edit(&edit("Quiet", i, 1)).is_none());
        }
        assert!(!detector.is_spiking("Quiet"));
    }

    #[test]
    fn inactivity_ends_spike_and_resets_window() {
        let detector = detector();
        detector.observe_edit(&edit("Foo", 0, 5000)).unwrap();

        let timeout = detector.config().inactivity_timeout();
        assert!(detector
            .expire_inactive(at(0) + timeout, TransitionCause::InactivityTimeout)
            .is_empty());

        let ended =
            detector.expire_inactive(at(1) + timeout, TransitionCause::InactivityTimeout);
        assert_eq!(ended.len(), 1);
        assert!(!ended[0].active);
        assert_eq!(ended[0].phase, SpikePhase::Normal);
        assert_eq!(ended[0].total_bytes, 5000);

        let state = detector.state("Foo").unwrap();
        assert_eq!(state.edits, 0);
        assert_eq!(state.bytes, 0);
        assert!(!detector.is_spiking("Foo"));

        // Already normal: a second sweep is a no-op.
        assert!(detector
            .expire_inactive(at(10_000), TransitionCause::InactivityTimeout)
            .is_empty());
    }

    #[test]
    fn hysteresis_requires_consecutive_slow_cycles() {
        let detector = detector();
        detector.observe_edit(&edit("Foo", 0, 5000)).unwrap();

        detector.observe_edit(&edit("Foo", 1, 1));
        assert!(detector.observe_cycle().is_empty()); // slow 1
        detector.observe_edit(&edit("Foo", 2, 1));
        assert!(detector.observe_cycle().is_empty()); // slow 2
        assert_eq!(detector.state("Foo").unwrap().cooldown_counter, 2);

        detector.observe_edit(&edit("Foo", 10, 1));
        detector.observe_edit(&edit("Foo", 11, 1));
        assert!(detector.observe_cycle().is_empty()); // busy: reset
        assert_eq!(detector.state("Foo").unwrap().cooldown_counter, 0);

        for secs in 20..22 {
            detector.observe_edit(&edit("Foo", secs, 1));
            assert!(detector.observe_cycle().is_empty());
        }
        detector.observe_edit(&edit("Foo", 22, 1));
        let ended = detector.observe_cycle();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].cause, TransitionCause::Cooldown);
        assert!(!ended[0].active);
        assert_eq!(ended[0].total_edits, 8);
        assert!(!detector.is_spiking("Foo"));
    }

    #[test]
    fn idle_cycles_leave_cooldown_untouched() {
        let detector = detector();
        detector.observe_edit(&edit("Foo", 0, 5000)).unwrap();
        detector.observe_edit(&edit("Foo", 1, 1));
        assert!(detector.observe_cycle().is_empty());
        assert_eq!(detector.state("Foo").unwrap().cooldown_counter, 1);

        for _ in 0..50 {
            assert!(detector.observe_cycle().is_empty());
        }
        assert_eq!(detector.state("Foo").unwrap().cooldown_counter, 1);
        assert!(detector.is_spiking("Foo"));
    }

    #[test]
    fn hysteresis_disabled_is_noop() {
        let detector = SpikeDetector::new(
            SpikeConfig::default(),
            HysteresisConfig {
                enabled: false,
                ..HysteresisConfig::default()
            },
        );
        detector.observe_edit(&edit("Foo", 0, 5000)).unwrap();
        for _ in 0..50 {
            assert!(detector.observe_cycle().is_empty());
        }
        assert!(detector.is_spiking("Foo"));
    }

    #[test]
    fn next_spike_measures_from_zero() {
        let detector = detector();
        detector.observe_edit(&edit("Foo", 0, 5000)).unwrap();
        detector.expire_inactive(at(100_000), TransitionCause::InactivityTimeout);

        assert!(detector.observe_edit(&edit("Foo", 100_001, 100)).is_none());
        let state = detector.state("Foo").unwrap();
        assert_eq!(state.edits, 1);
        assert_eq!(state.bytes, 100);
    }

    #[test]
    fn active_spikes_sorted_by_recency() {
        let detector = detector();
        detector.observe_edit(&edit("Old", 0, 5000));
        detector.observe_edit(&edit("New", 50, 5000));
        detector.observe_edit(&edit("Calm", 60, 1));

        let active = detector.active_spikes();
        let names: Vec<_> = active.iter().map(|s| s.entity.as_str()).collect();
        assert_eq!(names, vec!["New", "Old"]);
        assert_eq!(detector.tracked_entities(), 3);
    }
}
