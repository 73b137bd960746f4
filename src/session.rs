use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{SessionError, SessionResult, StreamError};
use crate::estimator::{DeadReckoner, EstimatorConfig, FusedSnapshot, NavEvent};
use crate::filters::NavigationState;
use crate::report::PacketCounters;
use crate::sensors::{config_options, ConfigOption, SensorStream};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, sensor untouched
    Idle,
    /// Sensor configured and streaming
    Streaming,
    /// Terminal; the session cannot be restarted
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Operator asked to stop
    Cancelled,
    /// The packet source ran dry (replayed log finished)
    EndOfStream,
    /// Single-shot capture completed
    Captured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Continuous,
    SingleShot,
}

/// Outcome of a session that ended without a connection failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub nav: NavigationState,
    pub counters: PacketCounters,
    pub snapshot: Option<FusedSnapshot>,
}

/// Stops a running session from another task.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Single-use run loop over one sensor stream.
///
/// The stream is released (`end_streaming`, then `disconnect`) exactly once on
/// every exit path: cancellation, end of stream, or a collaborator failure
/// during setup or mid-stream.
pub struct Session<S: SensorStream> {
    stream: S,
    config: EstimatorConfig,
    state: SessionState,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    events: Option<mpsc::UnboundedSender<NavEvent>>,

    // Lifecycle progress, consumed by shutdown
    connect_attempted: bool,
    stream_requested: bool,
}

impl<S: SensorStream> Session<S> {
    pub fn new(stream: S, config: EstimatorConfig) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            stream,
            config,
            state: SessionState::Idle,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            events: None,
            connect_attempted: false,
            stream_requested: false,
        }
    }

    /// Forward every navigation event (diagnostics and reports) to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<NavEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Stream and report until cancelled or the source ends.
    pub async fn run(&mut self) -> SessionResult<SessionSummary> {
        self.execute(RunMode::Continuous).await
    }

    /// Wait for one sample from every subsystem and return them fused.
    ///
    /// `None` when cancelled (or the source ended) before all three arrived.
    pub async fn capture_single(&mut self) -> SessionResult<Option<FusedSnapshot>> {
        let summary = self.execute(RunMode::SingleShot).await?;
        Ok(summary.snapshot)
    }

    async fn execute(&mut self, mode: RunMode) -> SessionResult<SessionSummary> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyUsed);
        }

        let outcome = self.drive(mode).await;
        self.shutdown().await;
        self.state = SessionState::Stopped;

        match &outcome {
            Ok(summary) => log::info!(
                "[session] stopped ({:?}): {} packets, {} integrated, path {:.2} m",
                summary.reason,
                summary.counters.received,
                summary.counters.integrated,
                summary.nav.total_path_length
            ),
            Err(e) => log::error!("[session] aborted: {}", e),
        }
        outcome
    }

    async fn drive(&mut self, mode: RunMode) -> SessionResult<SessionSummary> {
        self.connect_attempted = true;
        self.stream
            .connect()
            .await
            .map_err(|e| SessionError::connection("connect", e))?;

        let mut options = config_options(&self.config);
        // A fused snapshot needs altitude even when the profile skips it.
        if mode == RunMode::SingleShot && !options.contains(&ConfigOption::AltimeterOutput) {
            options.insert(1, ConfigOption::AltimeterOutput);
        }
        self.stream
            .configure(&options)
            .await
            .map_err(|e| SessionError::connection("configure", e))?;

        self.stream_requested = true;
        self.stream
            .begin_streaming()
            .await
            .map_err(|e| SessionError::connection("begin_streaming", e))?;

        self.state = SessionState::Streaming;
        log::info!(
            "[session] streaming ({} sensor settings, timeout {:.1}s)",
            options.len(),
            self.config.packet_timeout_secs
        );

        let timeout = packet_timeout(&self.config);
        let start = Instant::now();
        let mut nav = DeadReckoner::new(self.config.clone(), 0.0);
        let mut snapshot = None;

        let reason = loop {
            if *self.cancel_rx.borrow() {
                break StopReason::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => None,
                next = self.stream.next_packet(timeout) => Some(next),
            };
            let Some(next) = next else {
                break StopReason::Cancelled;
            };

            match next {
                Ok(Some(packet)) => {
                    let now = start.elapsed().as_secs_f64();
                    for event in nav.feed_packet(&packet, now) {
                        self.emit(event);
                    }
                    if mode == RunMode::SingleShot {
                        snapshot = nav.fused_snapshot();
                        if snapshot.is_some() {
                            break StopReason::Captured;
                        }
                    }
                }
                Ok(None) => {
                    nav.record_timeout();
                    log::debug!("[session] no packet within {:?}, polling again", timeout);
                }
                Err(StreamError::EndOfStream) => break StopReason::EndOfStream,
                Err(e) => return Err(SessionError::connection("next_packet", e)),
            }
        };

        Ok(SessionSummary {
            reason,
            nav: *nav.nav_state(),
            counters: nav.counters().clone(),
            snapshot,
        })
    }

    /// Release whatever was acquired. Safe to call more than once.
    async fn shutdown(&mut self) {
        if std::mem::take(&mut self.stream_requested) {
            if let Err(e) = self.stream.end_streaming().await {
                log::warn!("[session] end_streaming failed: {}", e);
            }
        }
        if std::mem::take(&mut self.connect_attempted) {
            if let Err(e) = self.stream.disconnect().await {
                log::warn!("[session] disconnect failed: {}", e);
            }
        }
    }

    fn emit(&self, event: NavEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is listening; keep navigating.
            let _ = tx.send(event);
        }
    }
}

fn packet_timeout(config: &EstimatorConfig) -> Duration {
    Duration::try_from_secs_f64(config.packet_timeout_secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(2))
}

/// Resolves once the flag flips to true.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
