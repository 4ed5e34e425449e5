//! One voice interaction: capture → transcribe → dispatch → speak.
//!
//! Sessions are arbitrated by a [`SessionGate`]: an explicit busy flag that
//! is checked first, plus an async mutex held for the whole session. A
//! trigger that arrives while a session is active is dropped; there is no
//! queueing and no preemption. The [`SessionGuard`] clears the busy flag
//! when dropped, and the vehicle's `is_listening` / `ai_talking` flags are
//! held by their own guards, so every exit path releases everything.

use crate::audio::{CaptureOutcome, Microphone, UtteranceRecorder};
use crate::command::CommandProcessor;
use crate::error::{CabinError, Result};
use crate::status::StatusBus;
use crate::stt::{SpeechToText, Transcript};
use crate::tts::TextToSpeech;
use crate::vehicle::SharedVehicle;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const STATUS_LISTENING: &str = "Listening...";
pub const STATUS_TIMEOUT: &str = "Timeout - didn't hear command.";
pub const STATUS_NOT_UNDERSTOOD: &str = "Sorry, I didn't catch that.";
pub const SPOKEN_NOT_UNDERSTOOD: &str = "I didn't catch that.";
pub const STATUS_THINKING: &str = "Thinking...";

/// Status text for a heard or typed command about to be processed.
pub fn processing_status(text: &str) -> String {
    format!("Processing: {text}")
}

/// What started a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    WakeWord,
    Manual,
}

/// Phases of a session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Capture,
    Transcribe,
    Dispatch,
    Speak,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Capture => "capture",
            Self::Transcribe => "transcribe",
            Self::Dispatch => "dispatch",
            Self::Speak => "speak",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A reply was produced and spoken.
    Completed { heard: String, reply: String },
    /// No speech started before the listen timeout.
    Timeout,
    /// Speech was captured but no words were recognized.
    NotUnderstood,
    /// Stopped at a phase boundary by cancellation.
    Cancelled,
    /// A phase failed; already reported on the status bus.
    Failed { phase: SessionPhase, error: String },
}

// ── Arbitration ─────────────────────────────────────────────────────

/// At-most-one-session arbitration. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    busy: Arc<AtomicBool>,
    lock: Arc<Mutex<()>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the gate without waiting. `None` if a session is active.
    pub fn try_begin(&self) -> Option<SessionGuard> {
        if self.is_busy() {
            return None;
        }
        let lock = Arc::clone(&self.lock).try_lock_owned().ok()?;
        self.busy.store(true, Ordering::Release);
        Some(SessionGuard {
            busy: Arc::clone(&self.busy),
            _lock: lock,
        })
    }

    /// Wait until no session holds the gate.
    pub async fn wait_idle(&self) {
        let _ = self.lock.lock().await;
    }
}

/// Held for the lifetime of one session.
#[derive(Debug)]
pub struct SessionGuard {
    busy: Arc<AtomicBool>,
    _lock: OwnedMutexGuard<()>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Sets one vehicle flag for as long as it lives.
struct FlagGuard {
    vehicle: SharedVehicle,
    listening: bool,
}

impl FlagGuard {
    fn listening(vehicle: &SharedVehicle) -> Self {
        vehicle.set_listening(true);
        Self {
            vehicle: vehicle.clone(),
            listening: true,
        }
    }

    fn talking(vehicle: &SharedVehicle) -> Self {
        vehicle.set_ai_talking(true);
        Self {
            vehicle: vehicle.clone(),
            listening: false,
        }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        if self.listening {
            self.vehicle.set_listening(false);
        } else {
            self.vehicle.set_ai_talking(false);
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Collaborators a session needs.
pub struct SessionContext {
    pub microphone: Arc<dyn Microphone>,
    pub recorder: UtteranceRecorder,
    pub stt: Arc<dyn SpeechToText>,
    pub processor: Arc<CommandProcessor>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vehicle: SharedVehicle,
    pub status: StatusBus,
}

impl SessionContext {
    /// Speak `text` with `ai_talking` set until playback ends or fails.
    pub(crate) async fn speak(&self, text: &str) -> Result<()> {
        let _talking = FlagGuard::talking(&self.vehicle);
        self.tts.speak(text).await
    }

    /// Speak a reply whose failure must not end the interaction.
    /// Failures are reported as "TTS Failed: ...".
    pub(crate) async fn speak_or_report(&self, text: &str) {
        if let Err(e) = self.speak(text).await {
            warn!("could not speak reply: {e}");
            self.status.emit(format!("TTS Failed: {e}"));
        }
    }
}

/// Run one session to completion while holding `guard`.
///
/// Never returns an error: failures are logged, reported on the status bus
/// and folded into [`SessionOutcome::Failed`].
pub async fn run_session(
    ctx: Arc<SessionContext>,
    guard: SessionGuard,
    trigger: SessionTrigger,
    cancel: CancellationToken,
) -> SessionOutcome {
    let session_id = Uuid::new_v4();
    info!(%session_id, ?trigger, "session started");

    let outcome = match run_phases(&ctx, &cancel).await {
        Ok(outcome) => outcome,
        Err((phase, e)) => {
            error!(%session_id, %phase, "session failed: {e}");
            ctx.status.emit(format!("Error: {e}"));
            SessionOutcome::Failed {
                phase,
                error: e.to_string(),
            }
        }
    };

    // Flag guards inside run_phases have already dropped.
    drop(guard);
    info!(%session_id, ?outcome, "session ended");
    outcome
}

type PhaseResult<T> = std::result::Result<T, (SessionPhase, CabinError)>;

fn at<T>(phase: SessionPhase, result: Result<T>) -> PhaseResult<T> {
    result.map_err(|e| (phase, e))
}

async fn run_phases(ctx: &SessionContext, cancel: &CancellationToken) -> PhaseResult<SessionOutcome> {
    use SessionPhase::{Capture, Dispatch, Speak, Transcribe};

    if cancel.is_cancelled() {
        return Ok(SessionOutcome::Cancelled);
    }

    // CAPTURE
    let listening = FlagGuard::listening(&ctx.vehicle);
    ctx.status.emit(STATUS_LISTENING);
    let microphone = Arc::clone(&ctx.microphone);
    let recorder = ctx.recorder.clone();
    let capture_cancel = cancel.clone();
    let captured = tokio::task::spawn_blocking(move || {
        let mut source = microphone.open()?;
        recorder.record(source.as_mut(), &capture_cancel)
    })
    .await
    .map_err(|e| CabinError::Pipeline(format!("capture task failed: {e}")));
    let utterance = match at(Capture, captured.and_then(|r| r))? {
        CaptureOutcome::Speech(utterance) => utterance,
        CaptureOutcome::Timeout => {
            ctx.status.emit(STATUS_TIMEOUT);
            return Ok(SessionOutcome::Timeout);
        }
        CaptureOutcome::Cancelled => return Ok(SessionOutcome::Cancelled),
    };

    // TRANSCRIBE
    if cancel.is_cancelled() {
        return Ok(SessionOutcome::Cancelled);
    }
    debug!("transcribing {:.2}s of audio", utterance.duration().as_secs_f32());
    let transcript = at(Transcribe, ctx.stt.transcribe(&utterance).await)?;
    drop(listening);

    let heard = match transcript {
        Transcript::Text(text) => text,
        Transcript::NoSpeech | Transcript::Unrecognized => {
            ctx.status.emit(STATUS_NOT_UNDERSTOOD);
            ctx.speak_or_report(SPOKEN_NOT_UNDERSTOOD).await;
            return Ok(SessionOutcome::NotUnderstood);
        }
    };
    ctx.status.emit(format!("You: {heard}"));

    // DISPATCH
    if cancel.is_cancelled() {
        return Ok(SessionOutcome::Cancelled);
    }
    ctx.status.emit(processing_status(&heard));
    ctx.status.emit(STATUS_THINKING);
    let outcome = at(Dispatch, ctx.processor.process(&heard).await)?;
    ctx.status.emit(format!("AI: {}", outcome.reply));

    // SPEAK
    if cancel.is_cancelled() {
        return Ok(SessionOutcome::Cancelled);
    }
    at(Speak, ctx.speak(&outcome.reply).await)?;

    Ok(SessionOutcome::Completed {
        heard,
        reply: outcome.reply,
    })
}
