//! Shared test doubles for integration tests.
//!
//! Every collaborator of the assistant has a scripted stand-in here: chat
//! client, microphone, speech recognizer, speaker and wake-word detector.

use async_trait::async_trait;
use cabin::audio::{AudioChunk, AudioSource, Microphone, Utterance};
use cabin::config::CabinConfig;
use cabin::llm::{ChatClient, ChatMessage};
use cabin::stt::{SpeechToText, Transcript};
use cabin::tts::TextToSpeech;
use cabin::wakeword::{WakewordDetector, WakewordLoader};
use cabin::{CabinError, Result, SharedVehicle, StatusBus, VoiceAssistant};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// 100ms of audio at 16kHz.
pub(crate) const CHUNK: usize = 1600;

/// Config with short capture windows so scripted sessions finish quickly.
pub(crate) fn test_config() -> CabinConfig {
    let mut config = CabinConfig::default();
    config.capture.ambient_calibration_ms = 200;
    config.capture.listen_timeout_secs = 1.0;
    config.capture.phrase_time_limit_secs = 2.0;
    config.capture.end_silence_ms = 300;
    config.session.cooldown_ms = 50;
    config.session.retry_backoff_secs = 0;
    config.status.history = 500;
    config.status.capacity = 500;
    config
}

/// Levels a cooperative speaker produces: quiet room, three loud chunks.
pub(crate) fn speech_levels() -> Vec<f32> {
    vec![0.001, 0.001, 0.3, 0.3, 0.3]
}

// ── Chat ────────────────────────────────────────────────────────────

/// Replies with a fixed string, or fails, and counts calls.
pub(crate) struct ScriptedChat {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedChat {
    pub(crate) fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_owned()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| CabinError::Llm("connection refused".into()))
    }
}

// ── Microphone ──────────────────────────────────────────────────────

/// Each `open` plays `levels` (one chunk per level) and then silence.
pub(crate) struct ScriptedMicrophone {
    levels: Vec<f32>,
    available: bool,
    fail_open: bool,
    fail_after: Option<usize>,
    opens: AtomicUsize,
}

impl ScriptedMicrophone {
    pub(crate) fn speaking() -> Arc<Self> {
        Self::with_levels(speech_levels())
    }

    pub(crate) fn silent() -> Arc<Self> {
        Self::with_levels(Vec::new())
    }

    pub(crate) fn with_levels(levels: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            levels,
            available: true,
            fail_open: false,
            fail_after: None,
            opens: AtomicUsize::new(0),
        })
    }

    pub(crate) fn broken() -> Arc<Self> {
        Arc::new(Self {
            levels: Vec::new(),
            available: true,
            fail_open: true,
            fail_after: None,
            opens: AtomicUsize::new(0),
        })
    }

    pub(crate) fn absent() -> Arc<Self> {
        Arc::new(Self {
            levels: Vec::new(),
            available: false,
            fail_open: true,
            fail_after: None,
            opens: AtomicUsize::new(0),
        })
    }

    /// Opens fine, streams silence, then fails after `chunks` reads.
    pub(crate) fn flaky(chunks: usize) -> Arc<Self> {
        Arc::new(Self {
            levels: Vec::new(),
            available: true,
            fail_open: false,
            fail_after: Some(chunks),
            opens: AtomicUsize::new(0),
        })
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Microphone for ScriptedMicrophone {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&self) -> Result<Box<dyn AudioSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            // A zero backoff would otherwise flood the status history.
            std::thread::sleep(Duration::from_millis(10));
            return Err(CabinError::Audio("device busy".into()));
        }
        Ok(Box::new(ScriptedSource {
            levels: self.levels.iter().copied().collect(),
            remaining: self.fail_after,
        }))
    }
}

struct ScriptedSource {
    levels: VecDeque<f32>,
    /// Reads left before the device drops out.
    remaining: Option<usize>,
}

impl AudioSource for ScriptedSource {
    fn read_chunk(&mut self, _timeout: Duration) -> Result<Option<AudioChunk>> {
        // Pace reads so an armed loop does not spin a core.
        std::thread::sleep(Duration::from_millis(1));
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                std::thread::sleep(Duration::from_millis(10));
                return Err(CabinError::Audio("device disconnected".into()));
            }
            *remaining -= 1;
        }
        let level = self.levels.pop_front().unwrap_or(0.0);
        Ok(Some(AudioChunk::new(vec![level; CHUNK], 16_000)))
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }
}

// ── Speech to text ──────────────────────────────────────────────────

/// Returns a fixed transcript. Optionally blocks until released, and
/// records the peak number of concurrent calls.
pub(crate) struct ScriptedStt {
    result: std::result::Result<Transcript, String>,
    hold: Option<Arc<Notify>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedStt {
    pub(crate) fn hearing(text: &str) -> Arc<Self> {
        Arc::new(Self::new(Ok(Transcript::Text(text.to_owned())), None))
    }

    pub(crate) fn unrecognized() -> Arc<Self> {
        Arc::new(Self::new(Ok(Transcript::Unrecognized), None))
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self::new(Err("model crashed".to_owned()), None))
    }

    /// Hears `text`, but each call waits for [`ScriptedStt::release`].
    pub(crate) fn held(text: &str) -> Arc<Self> {
        Arc::new(Self::new(
            Ok(Transcript::Text(text.to_owned())),
            Some(Arc::new(Notify::new())),
        ))
    }

    fn new(result: std::result::Result<Transcript, String>, hold: Option<Arc<Notify>>) -> Self {
        Self {
            result,
            hold,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.notify_one();
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(&self, _utterance: &Utterance) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.result.clone().map_err(CabinError::Stt)
    }
}

// ── Text to speech ──────────────────────────────────────────────────

/// Records what it was asked to say.
#[derive(Default)]
pub(crate) struct RecordingTts {
    spoken: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingTts {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub(crate) fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for RecordingTts {
    async fn speak(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(CabinError::Tts("speaker unplugged".into()));
        }
        self.spoken.lock().unwrap().push(text.to_owned());
        Ok(())
    }
}

/// Records whether `ai_talking` was set while each reply was spoken.
pub(crate) struct FlagObservingTts {
    vehicle: SharedVehicle,
    talking: Mutex<Vec<bool>>,
    fail: bool,
}

impl FlagObservingTts {
    pub(crate) fn new(vehicle: &SharedVehicle, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            vehicle: vehicle.clone(),
            talking: Mutex::new(Vec::new()),
            fail,
        })
    }

    pub(crate) fn talking(&self) -> Vec<bool> {
        self.talking.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for FlagObservingTts {
    async fn speak(&self, _text: &str) -> Result<()> {
        self.talking.lock().unwrap().push(self.vehicle.snapshot().ai_talking);
        if self.fail {
            return Err(CabinError::Tts("speaker unplugged".into()));
        }
        Ok(())
    }
}

// ── Wake word ───────────────────────────────────────────────────────

/// Detector that returns queued scores, then `rest` forever.
pub(crate) struct ScriptedWakeword {
    scores: Arc<Mutex<VecDeque<f32>>>,
    rest: f32,
}

impl ScriptedWakeword {
    pub(crate) fn new(scores: &[f32], rest: f32) -> Arc<Self> {
        Arc::new(Self {
            scores: Arc::new(Mutex::new(scores.iter().copied().collect())),
            rest,
        })
    }
}

impl WakewordLoader for ScriptedWakeword {
    fn load(&self) -> Result<Box<dyn WakewordDetector>> {
        Ok(Box::new(ScriptedDetector {
            scores: Arc::clone(&self.scores),
            rest: self.rest,
        }))
    }
}

struct ScriptedDetector {
    scores: Arc<Mutex<VecDeque<f32>>>,
    rest: f32,
}

impl WakewordDetector for ScriptedDetector {
    fn score(&mut self, _samples: &[f32]) -> f32 {
        self.scores.lock().unwrap().pop_front().unwrap_or(self.rest)
    }

    fn reset(&mut self) {}
}

/// Loader with no model available.
pub(crate) struct MissingWakeword;

impl WakewordLoader for MissingWakeword {
    fn load(&self) -> Result<Box<dyn WakewordDetector>> {
        Err(CabinError::Wakeword("no wake word reference recordings found".into()))
    }
}

// ── Assembly ────────────────────────────────────────────────────────

pub(crate) struct Fakes {
    pub chat: Arc<ScriptedChat>,
    pub microphone: Arc<ScriptedMicrophone>,
    pub stt: Arc<ScriptedStt>,
    pub tts: Arc<RecordingTts>,
    pub wakeword: Arc<dyn WakewordLoader>,
}

impl Fakes {
    /// A cooperative user asking for the headlights.
    pub(crate) fn lights_on() -> Self {
        Self {
            chat: ScriptedChat::replying(r#"{"tool": "lights", "args": {"on": "on"}}"#),
            microphone: ScriptedMicrophone::speaking(),
            stt: ScriptedStt::hearing("turn the lights on"),
            tts: RecordingTts::new(),
            wakeword: ScriptedWakeword::new(&[], 0.0),
        }
    }

    pub(crate) fn build(&self) -> VoiceAssistant {
        self.build_with(test_config())
    }

    pub(crate) fn build_with(&self, config: CabinConfig) -> VoiceAssistant {
        VoiceAssistant::builder(config)
            .with_chat(self.chat.clone())
            .with_microphone(self.microphone.clone())
            .with_stt(self.stt.clone())
            .with_tts(self.tts.clone())
            .with_wakeword(Arc::clone(&self.wakeword))
            .build()
            .expect("build assistant")
    }
}

/// Status texts recorded so far, oldest first.
pub(crate) fn statuses(bus: &StatusBus) -> Vec<String> {
    bus.recent().into_iter().map(|e| e.text).collect()
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub(crate) async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Wait until a status equal to `text` has been emitted.
pub(crate) async fn wait_for_status(bus: &StatusBus, text: &str) -> bool {
    eventually(Duration::from_secs(5), || statuses(bus).iter().any(|s| s == text)).await
}
