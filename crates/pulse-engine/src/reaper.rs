//! Periodic reaper
//!
//! Ends spikes that have gone quiet. Each sweep first expires spikes idle past
//! the inactivity timeout, then runs one hysteresis observation cycle. All
//! resulting transitions go to the notification queue.

use std::sync::Arc;

use pulse_types::TransitionCause;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ReaperConfig;
use crate::detector::SpikeDetector;
use crate::dispatcher::NotificationDispatcher;

pub struct Reaper {
    detector: Arc<SpikeDetector>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(
        detector: Arc<SpikeDetector>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            clock,
            config,
        }
    }

    /// One sweep at the clock's current time. Returns the number of spikes ended.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut ended = self
            .detector
            .expire_inactive(now, TransitionCause::InactivityTimeout);
        ended.extend(self.detector.observe_cycle());

        let count = ended.len();
        self.dispatcher.enqueue_all(ended);
        if count > 0 {
            debug!(ended = count, at = %now, "Reaper sweep");
        }
        count
    }

    /// Sweep once for spikes left over from replayed history.
    ///
    /// Runs between backfill and the live stream so that stale historical
    /// activity is not reported as currently spiking.
    pub fn end_historical_spikes(&self) -> usize {
        let ended = self
            .detector
            .expire_inactive(self.clock.now(), TransitionCause::HistoricalCleanup);
        let count = ended.len();
        self.dispatcher.enqueue_all(ended);
        info!(ended = count, "Ended stale spikes from historical data");
        count
    }

    /// Sweep on every interval tick until `shutdown` flips to `true` or its
    /// sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(interval_secs = self.config.interval_secs, "Reaper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DispatcherConfig, HysteresisConfig, SpikeConfig};
    use crate::dispatcher::NotificationSink;
    use crate::error::DeliveryError;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use parking_lot::Mutex;
    use pulse_types::{EditRecord, SpikePayload};

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<SpikePayload>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, payload: &SpikePayload) -> Result<(), DeliveryError> {
            self.seen.lock().push(payload.clone());
            Ok(())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    struct Fixture {
        detector: Arc<SpikeDetector>,
        clock: Arc<ManualClock>,
        reaper: Reaper,
        sink: Arc<RecordingSink>,
        worker: crate::dispatcher::DispatchWorker,
    }

    fn fixture(hysteresis: bool) -> Fixture {
        let detector = Arc::new(SpikeDetector::new(
            SpikeConfig::default(),
            HysteresisConfig {
                enabled: hysteresis,
                ..HysteresisConfig::default()
            },
        ));
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) =
            NotificationDispatcher::new(&DispatcherConfig::default(), sink.clone());
        let clock = Arc::new(ManualClock::new(at(0)));
        let reaper = Reaper::new(
            detector.clone(),
            dispatcher,
            clock.clone(),
            ReaperConfig::default(),
        );
        Fixture {
            detector,
            clock,
            reaper,
            sink,
            worker,
        }
    }

    #[tokio::test]
    async fn sweep_ends_idle_spike_exactly_once() {
        let f = fixture(false);
        f.detector
            .observe_edit(&EditRecord::new("Foo", at(0), 0, 5000))
            .unwrap();

        f.clock.advance(ChronoDuration::minutes(29));
        assert_eq!(f.reaper.sweep(), 0);
        assert!(f.detector.is_spiking("Foo"));

        f.clock.advance(ChronoDuration::minutes(2));
        assert_eq!(f.reaper.sweep(), 1);
        assert_eq!(f.reaper.sweep(), 0);
        assert!(!f.detector.is_spiking("Foo"));

        drop(f.reaper);
        f.worker.run().await;
        let seen = f.sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].is_active);
        assert_eq!(seen[0].title, "Foo");
        assert_eq!(seen[0].total_bytes, 5000);
    }

    #[tokio::test]
    async fn sweep_ends_slow_spike_after_cooldown() {
        let f = fixture(true);
        f.detector
            .observe_edit(&EditRecord::new("Foo", at(0), 0, 5000))
            .unwrap();

        // One edit per cycle stays below the sustain threshold.
        let cooldown = HysteresisConfig::default().cooldown;
        let mut ended = 0;
        for _ in 0..cooldown {
            f.clock.advance(ChronoDuration::minutes(1));
            f.detector
                .observe_edit(&EditRecord::new("Foo", f.clock.now(), 0, 1))
                .unwrap();
            ended += f.reaper.sweep();
        }
        assert_eq!(ended, 1);
        assert!(!f.detector.is_spiking("Foo"));
    }

    #[tokio::test]
    async fn idle_spike_outlives_cooldown_and_ends_on_timeout() {
        let f = fixture(true);
        f.detector
            .observe_edit(&EditRecord::new("Foo", at(0), 0, 5000))
            .unwrap();

        // Three times the default cooldown, up to the inactivity timeout.
        for _ in 0..30 {
            f.clock.advance(ChronoDuration::minutes(1));
            assert_eq!(f.reaper.sweep(), 0);
        }
        assert!(f.detector.is_spiking("Foo"));
        assert_eq!(f.detector.state("Foo").unwrap().cooldown_counter, 0);

        f.clock.advance(ChronoDuration::seconds(1));
        let ended = f
            .detector
            .expire_inactive(f.clock.now(), TransitionCause::InactivityTimeout);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].cause, TransitionCause::InactivityTimeout);
        assert_eq!(f.reaper.sweep(), 0);
        assert!(!f.detector.is_spiking("Foo"));
    }

    #[tokio::test]
    async fn historical_cleanup_only_ends_stale_spikes() {
        let f = fixture(false);
        f.detector
            .observe_edit(&EditRecord::new("Old", at(0), 0, 5000))
            .unwrap();
        f.detector
            .observe_edit(&EditRecord::new("Fresh", at(7_000), 0, 5000))
            .unwrap();
        f.clock.set(at(7_200));

        assert_eq!(f.reaper.end_historical_spikes(), 1);
        assert!(!f.detector.is_spiking("Old"));
        assert!(f.detector.is_spiking("Fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let f = fixture(false);
        f.detector
            .observe_edit(&EditRecord::new("Foo", at(0), 0, 5000))
            .unwrap();
        f.clock.set(at(10_000));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::new(f.reaper).run(rx));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!f.detector.is_spiking("Foo"));

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
