//! Bounded notification queue with a single background deliverer.
//!
//! Producers call [`NotificationDispatcher::enqueue`], which never blocks: a
//! full queue drops the transition. The [`DispatchWorker`] drains the queue in
//! enqueue order and hands each payload to a [`NotificationSink`]. Failed
//! deliveries are logged and discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pulse_types::{SpikePayload, SpikeTransition};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DispatcherConfig;
use crate::error::DeliveryError;

/// Outbound delivery target for spike notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &SpikePayload) -> Result<(), DeliveryError>;
}

/// Result of a single enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue at capacity; the transition was discarded.
    Dropped,
    /// Worker has shut down.
    Closed,
}

/// Running totals since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
    pub capacity: usize,
    pub pending: usize,
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Producer handle. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<SpikeTransition>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl NotificationDispatcher {
    /// Create the queue and its worker. Nothing is delivered until the worker
    /// is run.
    pub fn new(config: &DispatcherConfig, sink: Arc<dyn NotificationSink>) -> (Self, DispatchWorker) {
        let capacity = config.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let counters = Arc::new(Counters::default());
        let dispatcher = Self {
            sender,
            capacity,
            counters: counters.clone(),
        };
        let worker = DispatchWorker {
            receiver,
            sink,
            counters,
        };
        (dispatcher, worker)
    }

    pub fn enqueue(&self, transition: SpikeTransition) -> EnqueueOutcome {
        match self.sender.try_send(transition) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    entity = %dropped.entity,
                    active = dropped.active,
                    capacity = self.capacity,
                    "Notification queue full, dropping spike transition"
                );
                EnqueueOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(entity = %dropped.entity, "Notification worker gone, dropping spike transition");
                EnqueueOutcome::Closed
            }
        }
    }

    /// Enqueue each transition in order. Returns how many were queued.
    pub fn enqueue_all(&self, transitions: impl IntoIterator<Item = SpikeTransition>) -> usize {
        transitions
            .into_iter()
            .map(|t| self.enqueue(t))
            .filter(|outcome| *outcome == EnqueueOutcome::Queued)
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            capacity: self.capacity,
            pending: self.capacity.saturating_sub(self.sender.capacity()),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Consumer side of the queue.
pub struct DispatchWorker {
    receiver: mpsc::Receiver<SpikeTransition>,
    sink: Arc<dyn NotificationSink>,
    counters: Arc<Counters>,
}

impl DispatchWorker {
    /// Deliver until every [`NotificationDispatcher`] handle is dropped and the
    /// queue is drained.
    pub async fn run(mut self) {
        info!("Notification worker started");
        while let Some(transition) = self.receiver.recv().await {
            let payload = transition.to_payload();
            match self.sink.deliver(&payload).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    if transition.cause.ends_spike() {
                        info!(entity = %payload.title, cause = ?transition.cause, "Spike end notification delivered");
                    } else {
                        debug!(entity = %payload.title, active = payload.is_active, "Spike notification delivered");
                    }
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(entity = %payload.title, error = %e, "Spike notification failed, discarding");
                }
            }
        }
        info!("Notification worker stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
