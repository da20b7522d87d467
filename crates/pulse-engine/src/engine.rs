//! Engine facade
//!
//! Feeds each normalized edit to the counter store, the bucket aggregator and
//! the spike detector, and forwards resulting transitions to the dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_types::{EditRecord, Granularity, SpikeTransition, TransitionCause};
use tracing::{debug, instrument};

use crate::buckets::{BucketAggregator, TimeBucket};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::counters::{CounterEntry, CounterStore, LeaderboardEntry};
use crate::detector::{ActiveSpike, SpikeDetector, SpikeState};
use crate::dispatcher::{EnqueueOutcome, NotificationDispatcher};
use crate::error::EngineResult;
use crate::reaper::Reaper;
use crate::store::StateStore;

/// What one ingested edit did.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Totals for the entity after this edit.
    pub totals: CounterEntry,
    /// Volume added to the edit's bucket in every granularity.
    pub bucket_volume: u64,
    pub transition: Option<SpikeTransition>,
    pub enqueue: Option<EnqueueOutcome>,
}

impl IngestOutcome {
    pub fn started_spike(&self) -> bool {
        self.transition
            .as_ref()
            .map_or(false, |t| t.cause == TransitionCause::Started)
    }
}

pub struct PulseEngine {
    config: EngineConfig,
    counters: CounterStore,
    buckets: BucketAggregator,
    detector: Arc<SpikeDetector>,
    dispatcher: NotificationDispatcher,
    // One ingestion path at a time keeps per-entity updates in normalization order.
    ingest_lock: Mutex<()>,
    ingested: AtomicU64,
}

impl PulseEngine {
    pub fn new(config: &EngineConfig, dispatcher: NotificationDispatcher) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::assemble(
            config,
            CounterStore::new(),
            SpikeDetector::new(config.spike.clone(), config.hysteresis.clone()),
            dispatcher,
        ))
    }

    /// Engine over caller-supplied state stores.
    pub fn with_stores(
        config: &EngineConfig,
        dispatcher: NotificationDispatcher,
        counters: Arc<dyn StateStore<CounterEntry>>,
        spikes: Arc<dyn StateStore<SpikeState>>,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::assemble(
            config,
            CounterStore::with_store(counters),
            SpikeDetector::with_store(config.spike.clone(), config.hysteresis.clone(), spikes),
            dispatcher,
        ))
    }

    fn assemble(
        config: &EngineConfig,
        counters: CounterStore,
        detector: SpikeDetector,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            config: config.clone(),
            counters,
            buckets: BucketAggregator::new(&config.buckets),
            detector: Arc::new(detector),
            dispatcher,
            ingest_lock: Mutex::new(()),
            ingested: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[instrument(skip(self, edit), fields(entity = %edit.entity))]
    pub fn ingest(&self, edit: &EditRecord) -> IngestOutcome {
        let _guard = self.ingest_lock.lock();

        let totals = self.counters.record_edit(&edit.entity, edit.byte_volume());
        let bucket_volume = self.buckets.ingest(edit);
        let transition = self.detector.observe_edit(edit);
        let enqueue = transition
            .as_ref()
            .map(|t| self.dispatcher.enqueue(t.clone()));

        self.ingested.fetch_add(1, Ordering::Relaxed);
        debug!(
            "edit #{}: {} ({} B now, {} B total)",
            totals.edit_count,
            edit.entity,
            edit.byte_volume(),
            totals.byte_volume
        );

        IngestOutcome {
            totals,
            bucket_volume,
            transition,
            enqueue,
        }
    }

    /// Edits ingested since startup.
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }

    pub fn top_entities(&self, granularity: Granularity, k: Option<usize>) -> Vec<TimeBucket> {
        self.buckets.top_entities(granularity, k)
    }

    pub fn top_entities_by_label(&self, label: &str, k: Option<usize>) -> Vec<TimeBucket> {
        self.buckets.top_entities_by_label(label, k)
    }

    pub fn granularities(&self) -> Vec<Granularity> {
        self.buckets.granularities()
    }

    pub fn edit_count(&self, entity: &str) -> u64 {
        self.counters.edit_count(entity)
    }

    pub fn byte_volume(&self, entity: &str) -> u64 {
        self.counters.byte_volume(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.counters.entity_count()
    }

    pub fn top_by_edit_count(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.counters.top_by_edit_count(n)
    }

    pub fn top_by_byte_volume(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.counters.top_by_byte_volume(n)
    }

    pub fn is_spiking(&self, entity: &str) -> bool {
        self.detector.is_spiking(entity)
    }

    pub fn active_spikes(&self) -> Vec<ActiveSpike> {
        self.detector.active_spikes()
    }

    pub fn buckets(&self) -> &BucketAggregator {
        &self.buckets
    }

    pub fn detector(&self) -> &Arc<SpikeDetector> {
        &self.detector
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Reaper over this engine's detector and queue.
    pub fn reaper(&self, clock: Arc<dyn Clock>) -> Reaper {
        Reaper::new(
            self.detector.clone(),
            self.dispatcher.clone(),
            clock,
            self.config.reaper.clone(),
        )
    }
}
