//! Timer driven acquisition of aircraft snapshots.
//!
//! A [`PollingController`] owns one background task that runs a fetch cycle right away
//! and then once per interval. Each cycle replaces the whole snapshot and publishes it to
//! every registered [`CycleObserver`], in completion order. Cycles never overlap, and a
//! cycle that completes after [`PollingController::stop`] is dropped without being
//! published.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aircraft::AircraftRecord;
use crate::config::BoundingBox;
use crate::feed::AircraftSource;

/// How a fetch cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The feed answered; an empty aircraft list means an empty sky.
    Observed { server_time: i64 },
    /// The feed could not be reached or decoded; the aircraft list is empty.
    Failed { reason: String },
}

/// The complete set of aircraft known after one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// 1 for the first published cycle of a controller
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub aircraft: Vec<AircraftRecord>,
}

impl Snapshot {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Observed { .. })
    }
}

/// Receives the results of fetch cycles. Called from the polling task, so
/// implementations should not block.
pub trait CycleObserver: Send + 'static {
    fn loading_changed(&mut self, _loading: bool) {}

    fn snapshot_published(&mut self, snapshot: &Snapshot);
}

struct PollerState {
    /// bumped on every start and stop, a cycle only publishes if its epoch is current
    epoch: u64,
    running: bool,
    loading: bool,
    sequence: u64,
    snapshot: Option<Arc<Snapshot>>,
    observers: Vec<Box<dyn CycleObserver>>,
}

struct Shared<F> {
    source: F,
    bounds: BoundingBox,
    fetch_lock: tokio::sync::Mutex<()>,
    state: Mutex<PollerState>,
}

impl<F> Shared<F> {
    fn state(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: AircraftSource> Shared<F> {
    /// Runs one acquire-decode-publish cycle. Returns false if the result was discarded.
    async fn run_cycle(&self, epoch: u64) -> bool {
        let _fetching = self.fetch_lock.lock().await;

        {
            let mut state = self.state();
            if state.epoch != epoch {
                return false;
            }
            state.loading = true;
            for observer in state.observers.iter_mut() {
                observer.loading_changed(true);
            }
        }

        let result = self.source.fetch(&self.bounds).await;

        let mut state = self.state();
        if state.epoch != epoch {
            debug!("discarding result of cycle started before stop");
            return false;
        }

        let outcome = match &result {
            Ok(feed) => CycleOutcome::Observed { server_time: feed.server_time },
            Err(e) => {
                warn!("fetch cycle failed: {}", e);
                CycleOutcome::Failed { reason: e.to_string() }
            }
        };
        let aircraft = result.map(|feed| feed.aircraft).unwrap_or_default();

        state.sequence += 1;
        let snapshot = Arc::new(Snapshot { sequence: state.sequence, published_at: Utc::now(), outcome, aircraft });
        state.snapshot = Some(snapshot.clone());
        state.loading = false;

        debug!("publishing cycle {} with {} aircraft", snapshot.sequence, snapshot.aircraft.len());
        for observer in state.observers.iter_mut() {
            observer.loading_changed(false);
            observer.snapshot_published(&snapshot);
        }
        true
    }
}

pub struct PollingController<F> {
    shared: Arc<Shared<F>>,
    interval: Duration,
    shutdown: Option<watch::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<F: AircraftSource> PollingController<F> {
    pub fn new(source: F, bounds: BoundingBox, interval: Duration) -> Self {
        let state = PollerState {
            epoch: 0,
            running: false,
            loading: false,
            sequence: 0,
            snapshot: None,
            observers: Vec::new(),
        };
        PollingController {
            shared: Arc::new(Shared { source, bounds, fetch_lock: tokio::sync::Mutex::new(()), state: Mutex::new(state) }),
            interval,
            shutdown: None,
            task: None,
        }
    }

    pub fn subscribe(&self, observer: impl CycleObserver) {
        self.shared.state().observers.push(Box::new(observer));
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().running
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state().loading
    }

    /// The last published snapshot, `None` before the first cycle completed.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.shared.state().snapshot.clone()
    }

    /// Starts polling: one cycle now, then one per interval. Must be called from within a
    /// tokio runtime. Does nothing if already running.
    pub fn start(&mut self) {
        let epoch = {
            let mut state = self.shared.state();
            if state.running {
                return;
            }
            state.running = true;
            state.epoch += 1;
            state.epoch
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let shared = self.shared.clone();
        let interval = self.interval;

        info!("start polling every {:?} for {:?}", interval, shared.bounds);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                // not raced against shutdown, a stopped cycle completes and is discarded
                if !shared.run_cycle(epoch).await {
                    break;
                }
            }
            debug!("polling task {} finished", epoch);
        }));
    }

    /// Stops polling. Future ticks are cancelled, a cycle already in flight completes but
    /// is not published, and observers see loading end right away. The held snapshot is
    /// discarded. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state();
            if !state.running {
                return;
            }
            state.running = false;
            state.epoch += 1;
            state.snapshot = None;
            if state.loading {
                state.loading = false;
                for observer in state.observers.iter_mut() {
                    observer.loading_changed(false);
                }
            }
        }

        // dropping the sender wakes the task if it is waiting for the next tick
        self.shutdown.take();
        self.task.take();
        info!("stopped polling");
    }

    /// Runs one cycle right away, outside the timer. Returns false if the controller is
    /// not running or the result was discarded.
    pub async fn poll_now(&self) -> bool {
        let epoch = {
            let state = self.shared.state();
            if !state.running {
                return false;
            }
            state.epoch
        };
        self.shared.run_cycle(epoch).await
    }
}

impl<F> Drop for PollingController<F> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.running = false;
        state.epoch += 1;
        drop(state);
        self.shutdown.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::test_support::aircraft;
    use crate::config::WASHINGTON_DC;
    use crate::errors::FeedError;
    use crate::feed::{FeedSnapshot, SkipCounts};
    use crate::layer::{LiveLayer, SOURCE_ID};
    use crate::status::StatusReporter;
    use crate::surface::MemorySurface;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Loading(bool),
        Published(u64, Vec<String>, bool),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn published(&self) -> Vec<(u64, Vec<String>, bool)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Published(seq, ids, ok) => Some((seq, ids, ok)),
                    _ => None,
                })
                .collect()
        }
    }

    impl CycleObserver for Recorder {
        fn loading_changed(&mut self, loading: bool) {
            self.events.lock().unwrap().push(Event::Loading(loading));
        }

        fn snapshot_published(&mut self, snapshot: &Snapshot) {
            let ids = snapshot.aircraft.iter().map(|a| a.icao24.clone()).collect();
            self.events.lock().unwrap().push(Event::Published(snapshot.sequence, ids, snapshot.is_success()));
        }
    }

    type Scripted = Result<Vec<&'static str>, ()>;

    /// Returns scripted results in order, then empty skies. Optionally blocks every
    /// fetch until released.
    #[derive(Default)]
    struct ScriptedFeed {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        entered: Notify,
        gate: Option<Notify>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Scripted>) -> Self {
            ScriptedFeed { script: Mutex::new(script.into()), ..Default::default() }
        }

        fn gated(script: Vec<Scripted>) -> Self {
            ScriptedFeed { gate: Some(Notify::new()), ..Self::new(script) }
        }
    }

    impl AircraftSource for Arc<ScriptedFeed> {
        async fn fetch(&self, _bounds: &BoundingBox) -> Result<FeedSnapshot, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(vec![]));
            match next {
                Ok(ids) => Ok(FeedSnapshot {
                    server_time: 1690000000,
                    aircraft: ids.into_iter().map(|id| aircraft(id, -77.0, 38.9)).collect(),
                    skipped: SkipCounts::default(),
                }),
                Err(()) => Err(FeedError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_every_interval() {
        let feed = Arc::new(ScriptedFeed::new(vec![Ok(vec!["abc123", "def456"]), Ok(vec!["abc123"]), Ok(vec![])]));
        let recorder = Recorder::default();
        let mut controller = PollingController::new(feed.clone(), WASHINGTON_DC, Duration::from_secs(10));
        controller.subscribe(recorder.clone());

        controller.start();
        controller.start();
        tokio::time::sleep(Duration::from_secs(25)).await;
        controller.stop();

        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            recorder.published(),
            vec![
                (1, ids(&["abc123", "def456"]), true),
                (2, ids(&["abc123"]), true),
                (3, vec![], true),
            ]
        );
        assert_eq!(
            &recorder.events()[..3],
            &[Event::Loading(true), Event::Loading(false), Event::Published(1, ids(&["abc123", "def456"]), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_publishes_empty_snapshot() {
        let feed = Arc::new(ScriptedFeed::new(vec![Ok(vec!["abc123"]), Err(())]));
        let recorder = Recorder::default();
        let mut controller = PollingController::new(feed.clone(), WASHINGTON_DC, Duration::from_secs(10));
        controller.subscribe(recorder.clone());

        controller.start();
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(recorder.published(), vec![(1, ids(&["abc123"]), true), (2, vec![], false)]);
        let snapshot = controller.snapshot().unwrap();
        assert!(snapshot.aircraft.is_empty());
        assert!(matches!(snapshot.outcome, CycleOutcome::Failed { .. }));
        assert!(!controller.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_layer_drops_departed_aircraft() {
        let feed = Arc::new(ScriptedFeed::new(vec![Ok(vec!["abc123", "def456"]), Ok(vec!["abc123"])]));
        let layer = LiveLayer::new(MemorySurface::new());
        layer.with_surface(|surface| surface.set_style_loaded(true));
        let mut controller = PollingController::new(feed.clone(), WASHINGTON_DC, Duration::from_secs(10));
        controller.subscribe(layer.clone());

        controller.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let data = layer.with_surface(|surface| surface.source(SOURCE_ID).cloned()).unwrap();
        assert_eq!(data.len(), 2);

        tokio::time::sleep(Duration::from_secs(14)).await;
        controller.stop();

        let data = layer.with_surface(|surface| surface.source(SOURCE_ID).cloned()).unwrap();
        assert_eq!(data.len(), 1);
        assert!(data.find("abc123").is_some());
        assert!(data.find("def456").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_cycle() {
        let feed = Arc::new(ScriptedFeed::gated(vec![Ok(vec!["abc123"])]));
        let recorder = Recorder::default();
        let status = StatusReporter::new();
        let mut controller = PollingController::new(feed.clone(), WASHINGTON_DC, Duration::from_secs(10));
        controller.subscribe(recorder.clone());
        controller.subscribe(status.clone());

        controller.start();
        feed.entered.notified().await;
        assert!(controller.is_loading());
        assert!(status.status().loading);

        controller.stop();
        assert!(!controller.is_loading());
        assert!(!status.status().loading);
        assert_ne!(status.status().summary(), "Updating...");
        assert_eq!(recorder.events(), vec![Event::Loading(true), Event::Loading(false)]);
        feed.gate.as_ref().unwrap().notify_one();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.events(), vec![Event::Loading(true), Event::Loading(false)]);
        assert!(controller.snapshot().is_none());
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_now_and_restart() {
        let feed = Arc::new(ScriptedFeed::new(vec![Ok(vec!["abc123"]), Ok(vec!["def456"]), Ok(vec!["ghi789"])]));
        let recorder = Recorder::default();
        let mut controller = PollingController::new(feed.clone(), WASHINGTON_DC, Duration::from_secs(10));
        controller.subscribe(recorder.clone());

        assert!(!controller.poll_now().await);

        controller.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.poll_now().await);
        controller.stop();
        controller.stop();

        controller.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        controller.stop();

        assert_eq!(
            recorder.published(),
            vec![(1, ids(&["abc123"]), true), (2, ids(&["def456"]), true), (3, ids(&["ghi789"]), true)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let feed = Arc::new(ScriptedFeed::new(vec![]));
        let controller_feed = feed.clone();
        {
            let mut controller = PollingController::new(controller_feed, WASHINGTON_DC, Duration::from_secs(10));
            controller.start();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }
}
