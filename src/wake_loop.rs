//! Supervising wake-word loop.
//!
//! ```text
//! STOPPED ──start──▶ ARMED ──score > threshold, gate free──▶ TRIGGERED
//!                      ▲                                        │ session
//!                      └──────────── COOLDOWN (1s) ◀────────────┘
//! ```
//!
//! While armed, the loop owns the microphone and scores every chunk on a
//! blocking thread. On trigger it releases the microphone, runs exactly one
//! session on its own task, cools down and re-arms. If another session is
//! already active (manual trigger) the loop releases the microphone and
//! waits for it to finish. Device failures are retried forever with a fixed
//! backoff; only consecutive failures without any audio in between count
//! towards the persistent-error report.

use crate::audio::Microphone;
use crate::config::SessionConfig;
use crate::session::{SessionContext, SessionGate, SessionTrigger, run_session};
use crate::status::StatusBus;
use crate::wakeword::{WakewordDetector, WakewordLoader};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const STATUS_ARMED: &str = "Say 'Hey Jarvis'...";
pub const STATUS_DETECTED: &str = "Wake Word Detected!";
pub const STATUS_DEGRADED: &str = "Wake word unavailable. Text input only.";

const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Wake loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Armed,
    Triggered,
    Cooldown,
}

enum ArmOutcome {
    Triggered(f32),
    Busy,
    Cancelled,
    /// `streamed` is set when the device delivered audio before failing.
    DeviceError { error: String, streamed: bool },
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the wake-word detection task.
pub struct WakewordLoop {
    ctx: Arc<SessionContext>,
    gate: SessionGate,
    loader: Arc<dyn WakewordLoader>,
    session: SessionConfig,
    threshold: f32,
    state: watch::Sender<LoopState>,
    running: Mutex<Option<Running>>,
}

impl WakewordLoop {
    pub fn new(
        ctx: Arc<SessionContext>,
        gate: SessionGate,
        loader: Arc<dyn WakewordLoader>,
        session: SessionConfig,
        threshold: f32,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Stopped);
        Self {
            ctx,
            gate,
            loader,
            session,
            threshold,
            state,
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Arm detection. Returns `false` and reports degraded mode on the
    /// status bus if the microphone or the wake-word model is unavailable.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, parent: &CancellationToken) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return true;
        }

        if !self.ctx.microphone.is_available() {
            warn!("no input device, wake word disabled");
            self.ctx.status.emit(STATUS_DEGRADED);
            return false;
        }
        let detector = match self.loader.load() {
            Ok(detector) => detector,
            Err(e) => {
                warn!("wake word model unavailable: {e}");
                self.ctx.status.emit(STATUS_DEGRADED);
                return false;
            }
        };

        let cancel = parent.child_token();
        let worker = Worker {
            ctx: Arc::clone(&self.ctx),
            gate: self.gate.clone(),
            detector: Arc::new(Mutex::new(detector)),
            session: self.session.clone(),
            threshold: self.threshold,
            state: self.state.clone(),
            cancel: cancel.clone(),
        };
        self.state.send_replace(LoopState::Armed);
        let handle = tokio::spawn(worker.run());
        *running = Some(Running { cancel, handle });
        info!("wake word loop started (threshold {})", self.threshold);
        true
    }

    /// Request a cooperative stop. Returns immediately.
    pub fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(r) = running.as_ref() {
            r.cancel.cancel();
        }
    }

    /// Stop and wait for the loop (and any session it started) to finish.
    pub async fn shutdown(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(r) = running {
            r.cancel.cancel();
            let _ = r.handle.await;
        }
        self.state.send_replace(LoopState::Stopped);
    }
}

struct Worker {
    ctx: Arc<SessionContext>,
    gate: SessionGate,
    detector: Arc<Mutex<Box<dyn WakewordDetector>>>,
    session: SessionConfig,
    threshold: f32,
    state: watch::Sender<LoopState>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut failures = 0u32;

        while !self.cancel.is_cancelled() {
            self.state.send_replace(LoopState::Armed);
            if failures == 0 {
                self.ctx.status.emit(STATUS_ARMED);
            }

            let microphone = Arc::clone(&self.ctx.microphone);
            let detector = Arc::clone(&self.detector);
            let gate = self.gate.clone();
            let cancel = self.cancel.clone();
            let threshold = self.threshold;
            // Announce once audio flows again after a failure.
            let recovered = (failures > 0).then(|| self.ctx.status.clone());
            let outcome = tokio::task::spawn_blocking(move || {
                arm(microphone.as_ref(), &detector, &gate, &cancel, threshold, recovered)
            })
            .await
            .unwrap_or_else(|e| ArmOutcome::DeviceError {
                error: format!("detector task failed: {e}"),
                streamed: false,
            });

            match outcome {
                ArmOutcome::Cancelled => break,
                ArmOutcome::Triggered(score) => {
                    failures = 0;
                    self.state.send_replace(LoopState::Triggered);
                    info!("wake word detected (score {score:.3})");
                    match self.gate.try_begin() {
                        Some(guard) => {
                            self.ctx.status.emit(STATUS_DETECTED);
                            let session = tokio::spawn(run_session(
                                Arc::clone(&self.ctx),
                                guard,
                                SessionTrigger::WakeWord,
                                self.cancel.child_token(),
                            ));
                            if let Err(e) = session.await {
                                warn!("session task failed: {e}");
                            }
                        }
                        None => {
                            debug!("session started elsewhere, not triggering");
                            if !self.wait_idle().await {
                                break;
                            }
                        }
                    }
                    if !self.cooldown().await {
                        break;
                    }
                }
                ArmOutcome::Busy => {
                    failures = 0;
                    if !self.wait_idle().await || !self.cooldown().await {
                        break;
                    }
                }
                ArmOutcome::DeviceError { error: e, streamed } => {
                    if streamed {
                        failures = 0;
                    }
                    failures += 1;
                    warn!(failures, "microphone error: {e}");
                    self.ctx.status.emit(format!("Mic Error: {e}. Retrying..."));
                    if failures == self.session.persistent_error_after {
                        self.ctx.status.emit(format!(
                            "Microphone still unavailable after {failures} attempts. Retrying every {}s.",
                            self.session.retry_backoff_secs
                        ));
                    }
                    if !self.sleep(self.session.retry_backoff()).await {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(LoopState::Stopped);
        info!("wake word loop stopped");
    }

    /// Returns `false` if cancelled while waiting.
    async fn wait_idle(&self) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = self.gate.wait_idle() => true,
        }
    }

    async fn cooldown(&self) -> bool {
        self.state.send_replace(LoopState::Cooldown);
        self.sleep(self.session.cooldown()).await
    }

    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

/// Blocking: open the microphone and score chunks until something happens.
/// The microphone is released on return.
fn arm(
    microphone: &dyn Microphone,
    detector: &Mutex<Box<dyn WakewordDetector>>,
    gate: &SessionGate,
    cancel: &CancellationToken,
    threshold: f32,
    mut recovered: Option<StatusBus>,
) -> ArmOutcome {
    let mut source = match microphone.open() {
        Ok(source) => source,
        Err(e) => {
            return ArmOutcome::DeviceError {
                error: e.to_string(),
                streamed: false,
            };
        }
    };
    let mut streamed = false;
    let mut detector = detector.lock().unwrap_or_else(|p| p.into_inner());
    detector.reset();

    loop {
        if cancel.is_cancelled() {
            return ArmOutcome::Cancelled;
        }
        if gate.is_busy() {
            return ArmOutcome::Busy;
        }
        match source.read_chunk(READ_TIMEOUT) {
            Ok(Some(chunk)) => {
                if !streamed {
                    streamed = true;
                    if let Some(status) = recovered.take() {
                        info!("microphone recovered");
                        status.emit(STATUS_ARMED);
                    }
                }
                let score = detector.score(&chunk.samples);
                if score > threshold && !gate.is_busy() {
                    detector.reset();
                    return ArmOutcome::Triggered(score);
                }
            }
            Ok(None) => {}
            Err(e) => {
                return ArmOutcome::DeviceError {
                    error: e.to_string(),
                    streamed,
                };
            }
        }
    }
}
