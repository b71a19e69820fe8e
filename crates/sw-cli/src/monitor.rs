//! The monitoring loop.
//!
//! The loop polls the scale at a fixed cadence and feeds each sample to the
//! detector. A removal event switches it to alerting: evidence is recorded
//! (with one recovery attempt), the removal is optionally confirmed by
//! re-weighing, and the alert is handed to a background dispatch task. The
//! loop then re-arms with no baseline.
//!
//! Blocking work (scale reads, recording) runs on the blocking pool. At most
//! one capture runs at a time, and a new alert waits for the previous
//! dispatch so the single-slot evidence file is never overwritten while it is
//! being uploaded.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sw_capture::{CameraLocator, CaptureError, CaptureFailed, EvidenceRecorder, StreamOpener};
use sw_core::{
    EventDetector, EvidenceArtifact, QuietHours, RemovalEvent, WeightSample, WeightSource,
};
use sw_notify::{AlertDispatcher, MissingFootage, Notifier};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use uuid::Uuid;

/// Produces an evidence clip for an alert.
pub trait Evidence: Send + Sync + 'static {
    fn record(&self) -> Result<EvidenceArtifact, CaptureFailed>;
}

impl<F> Evidence for F
where
    F: Fn() -> Result<EvidenceArtifact, CaptureFailed> + Send + Sync + 'static,
{
    fn record(&self) -> Result<EvidenceArtifact, CaptureFailed> {
        self()
    }
}

/// A recorder bound to the camera it films.
pub struct Camera<O> {
    recorder: EvidenceRecorder<O>,
    locator: Box<dyn CameraLocator + Send + Sync>,
}

impl<O> Camera<O> {
    pub fn new(recorder: EvidenceRecorder<O>, locator: Box<dyn CameraLocator + Send + Sync>) -> Self {
        Self { recorder, locator }
    }
}

impl<O> Evidence for Camera<O>
where
    O: StreamOpener + Send + Sync + 'static,
{
    fn record(&self) -> Result<EvidenceArtifact, CaptureFailed> {
        self.recorder.capture_with_recovery(&*self.locator)
    }
}

/// Loop tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub sample_window: u32,
    /// Drop alerts whose weight came back within this many grams.
    pub confirm_tolerance: Option<f64>,
}

/// Outcome of recording evidence for one alert.
#[derive(Debug)]
enum Footage {
    Clip(EvidenceArtifact),
    Missing(MissingFootage),
}

/// Logical state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Watching samples for removals.
    Armed,
    /// Recording and dispatching an alert.
    Alerting,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub samples: u64,
    pub read_failures: u64,
    pub alerts: u64,
    /// Alerts dropped because the items were put back.
    pub retracted: u64,
    /// Alerts whose recording was cut short by shutdown.
    pub interrupted: u64,
}

pub struct MonitorLoop<S, Q, E, N: ?Sized> {
    scale: Arc<Mutex<S>>,
    detector: EventDetector<Q>,
    evidence: Arc<E>,
    dispatcher: Arc<AlertDispatcher<N>>,
    settings: MonitorSettings,
    state: MonitorState,
    pending: Option<JoinHandle<()>>,
    stats: MonitorStats,
}

impl<S, Q, E, N> MonitorLoop<S, Q, E, N>
where
    S: WeightSource + Send + 'static,
    Q: QuietHours,
    E: Evidence,
    N: Notifier + ?Sized + 'static,
{
    pub fn new(
        scale: S,
        detector: EventDetector<Q>,
        evidence: E,
        dispatcher: Arc<AlertDispatcher<N>>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            scale: Arc::new(Mutex::new(scale)),
            detector,
            evidence: Arc::new(evidence),
            dispatcher,
            settings,
            state: MonitorState::Armed,
            pending: None,
            stats: MonitorStats::default(),
        }
    }

    pub const fn state(&self) -> MonitorState {
        self.state
    }

    /// Runs until `shutdown` reads `true` or its sender is dropped, then
    /// waits for any in-flight dispatch.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> MonitorStats {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            poll_interval = ?self.settings.poll_interval,
            "monitor armed"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        tracing::info!("monitor stopping");
        if let Some(pending) = self.pending.take() {
            tracing::info!("waiting for in-flight dispatch");
            if let Err(err) = pending.await {
                tracing::warn!(%err, "dispatch task failed");
            }
        }
        self.stats
    }

    async fn tick(&mut self) {
        let Some(grams) = self.read_weight().await else {
            self.stats.read_failures += 1;
            return;
        };
        self.stats.samples += 1;
        tracing::trace!(grams, "sample");

        if let Some(event) = self.detector.observe(WeightSample::now(grams)) {
            let cycle_id = Uuid::new_v4();
            let span = tracing::info_span!("alert", %cycle_id);
            self.alert(event).instrument(span).await;
        }
    }

    /// Reads the scale off the async workers. Failures are logged here.
    async fn read_weight(&self) -> Option<f64> {
        let scale = Arc::clone(&self.scale);
        let window = self.settings.sample_window;
        let read = tokio::task::spawn_blocking(move || {
            scale
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read(window)
        })
        .await;

        match read {
            Ok(Ok(grams)) => Some(grams),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "scale read failed, skipping tick");
                None
            }
            Err(err) => {
                tracing::error!(error = %err, "scale read task failed");
                None
            }
        }
    }

    async fn alert(&mut self, event: RemovalEvent) {
        self.state = MonitorState::Alerting;
        self.stats.alerts += 1;
        tracing::info!(
            units = event.estimated_units_removed(),
            previous_grams = event.previous_weight_grams(),
            "removal detected"
        );

        if let Some(pending) = self.pending.take() {
            tracing::debug!("waiting for previous dispatch");
            if let Err(err) = pending.await {
                tracing::warn!(%err, "previous dispatch task failed");
            }
        }

        let footage = self.record_evidence().await;
        if matches!(footage, Footage::Missing(MissingFootage::Interrupted)) {
            self.stats.interrupted += 1;
        }

        if matches!(footage, Footage::Clip(_)) && self.retracted(&event).await {
            self.stats.retracted += 1;
        } else {
            let dispatcher = Arc::clone(&self.dispatcher);
            let dispatch = async move {
                match footage {
                    Footage::Clip(evidence) => dispatcher.dispatch(&event, Some(&evidence)).await,
                    Footage::Missing(missing) => dispatcher.dispatch_text(&event, missing).await,
                }
            };
            self.pending = Some(tokio::spawn(dispatch.in_current_span()));
        }

        self.detector.reset();
        self.state = MonitorState::Armed;
    }

    async fn record_evidence(&self) -> Footage {
        let evidence = Arc::clone(&self.evidence);
        match tokio::task::spawn_blocking(move || evidence.record()).await {
            Ok(Ok(artifact)) => Footage::Clip(artifact),
            Ok(Err(failed)) if matches!(failed.last(), CaptureError::Cancelled) => {
                tracing::info!("recording interrupted by shutdown");
                Footage::Missing(MissingFootage::Interrupted)
            }
            Ok(Err(failed)) => {
                tracing::warn!(error = %failed, "no evidence for this alert");
                Footage::Missing(MissingFootage::CameraUnreachable)
            }
            Err(err) => {
                tracing::error!(error = %err, "capture task failed");
                Footage::Missing(MissingFootage::CameraUnreachable)
            }
        }
    }

    /// Whether the removed items have been put back.
    ///
    /// A failed read never retracts an alert.
    async fn retracted(&self, event: &RemovalEvent) -> bool {
        let Some(tolerance) = self.settings.confirm_tolerance else {
            return false;
        };
        let Some(current) = self.read_weight().await else {
            return false;
        };
        let returned = event.previous_weight_grams() <= current + tolerance;
        if returned {
            tracing::info!(
                grams = current,
                previous_grams = event.previous_weight_grams(),
                "weight restored, alert dropped"
            );
        }
        returned
    }
}
