//! Spike lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detector phase for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpikePhase {
    #[default]
    Normal,
    Spiking,
}

/// Why a transition event was produced. Not part of the wire payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// NORMAL -> SPIKING.
    Started,
    /// Edit received while already SPIKING.
    Updated,
    /// Reaper found no edits for longer than the inactivity timeout.
    InactivityTimeout,
    /// Hysteresis: enough consecutive quiet observation cycles.
    Cooldown,
    /// Startup sweep after historical backfill.
    HistoricalCleanup,
}

impl TransitionCause {
    pub fn ends_spike(&self) -> bool {
        matches!(
            self,
            TransitionCause::InactivityTimeout
                | TransitionCause::Cooldown
                | TransitionCause::HistoricalCleanup
        )
    }
}

/// A spike state change (or in-spike update) for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeTransition {
    pub entity: String,
    pub phase: SpikePhase,
    pub cause: TransitionCause,
    pub start_time: DateTime<Utc>,
    pub last_edit_time: DateTime<Utc>,
    pub total_edits: u64,
    pub total_bytes: u64,
    pub active: bool,
}

impl SpikeTransition {
    /// Outbound wire shape.
    pub fn to_payload(&self) -> SpikePayload {
        SpikePayload {
            title: self.entity.clone(),
            start_time: self.start_time,
            last_edit_time: self.last_edit_time,
            total_edits: self.total_edits,
            total_bytes: self.total_bytes,
            is_active: self.active,
        }
    }
}

/// JSON body POSTed to the notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikePayload {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub last_edit_time: DateTime<Utc>,
    pub total_edits: u64,
    pub total_bytes: u64,
    pub is_active: bool,
}
