//! Pulse Types - shared vocabulary for edit activity monitoring
//!
//! Pulse watches the edit stream of one collaboratively edited corpus and
//! derives two signals from it: time-bucketed activity aggregates and a
//! per-entity spike lifecycle. This crate holds the types every layer agrees on.
//!
//! ## Key Concepts
//!
//! - **RawEdit**: an edit as decoded from either feed (live stream or backfill)
//! - **EditRecord**: the canonical, validated edit the engine consumes
//! - **Granularity**: a fixed, epoch-aligned bucket width
//! - **SpikeTransition**: a spike start, update or end for one entity
//! - **SpikePayload**: the wire shape delivered to the notification endpoint

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod edit;
pub mod granularity;
pub mod normalize;
pub mod spike;
pub mod wire;

pub use edit::EditRecord;
pub use granularity::{Granularity, GranularityParseError};
pub use normalize::{parse_timestamp, Normalizer, NormalizerConfig, Rejection};
pub use spike::{SpikePayload, SpikePhase, SpikeTransition, TransitionCause};
pub use wire::{
    decode_historical, HistoricalEdit, LiveChange, LiveLength, LiveMeta, RawEdit, RawTimestamp,
};
