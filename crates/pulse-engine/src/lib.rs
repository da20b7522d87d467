//! Pulse Engine - aggregation and spike detection over normalized edits
//!
//! Every edit passes through three independent components:
//!
//! - **Counter store**: all-time edit count and byte volume per entity
//! - **Bucket aggregator**: per-entity volume in epoch-aligned windows, one
//!   series per configured granularity
//! - **Spike detector**: a NORMAL/SPIKING state machine per entity
//!
//! Spike transitions flow into a bounded [`NotificationDispatcher`] that never
//! blocks ingestion. A [`Reaper`] ends spikes that stop receiving edits.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pulse_engine::{EngineConfig, NotificationDispatcher, PulseEngine, SystemClock};
//! # use pulse_engine::{NotificationSink, DeliveryError};
//! # struct Sink;
//! # #[async_trait::async_trait]
//! # impl NotificationSink for Sink {
//! #     async fn deliver(&self, _: &pulse_types::SpikePayload) -> Result<(), DeliveryError> { Ok(()) }
//! # }
//! # async fn demo() -> Result<(), pulse_engine::EngineError> {
//! let config = EngineConfig::default();
//! let (dispatcher, worker) = NotificationDispatcher::new(&config.dispatcher, Arc::new(Sink));
//! worker.spawn();
//!
//! let engine = PulseEngine::new(&config, dispatcher)?;
//! let reaper = Arc::new(engine.reaper(Arc::new(SystemClock)));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod buckets;
pub mod clock;
pub mod config;
pub mod counters;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod reaper;
pub mod store;

pub use buckets::{BucketAggregator, TimeBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BucketConfig, DispatcherConfig, EngineConfig, HysteresisConfig, ReaperConfig, SpikeConfig,
    TriggerPolicy, TriggerReason,
};
pub use counters::{CounterEntry, CounterStore, LeaderboardEntry};
pub use detector::{ActiveSpike, SpikeDetector, SpikeState};
pub use dispatcher::{
    DispatchWorker, DispatcherStats, EnqueueOutcome, NotificationDispatcher, NotificationSink,
};
pub use engine::{IngestOutcome, PulseEngine};
pub use error::{DeliveryError, EngineError, EngineResult};
pub use reaper::Reaper;
pub use store::{RwLockStore, ShardedStore, StateStore};
