//! High-level assistant facade.
//!
//! [`VoiceAssistant`] wires the collaborators together and exposes the
//! operations a front end needs: start/stop the wake loop, trigger a
//! session manually, submit typed text, and observe status and vehicle
//! state. Defaults come from [`CabinConfig`]; any collaborator can be
//! replaced before [`AssistantBuilder::build`].

use crate::actions::ActionRegistry;
use crate::audio::{CpalMicrophone, Microphone, UtteranceRecorder};
use crate::command::{CommandOutcome, CommandProcessor};
use crate::config::CabinConfig;
use crate::error::Result;
use crate::llm::{ApiChat, ChatClient};
use crate::session::{
    STATUS_THINKING, SessionContext, SessionGate, SessionOutcome, SessionTrigger, processing_status,
    run_session,
};
use crate::status::{StatusBus, StatusEvent};
use crate::stt::{HttpTranscriber, SpeechToText};
use crate::tts::{TextToSpeech, speaker_from_config};
use crate::vehicle::{SharedVehicle, VehicleState};
use crate::wake_loop::{LoopState, WakewordLoop};
use crate::wakeword::{ReferenceLoader, WakewordLoader};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builder for [`VoiceAssistant`].
pub struct AssistantBuilder {
    config: CabinConfig,
    chat: Option<Arc<dyn ChatClient>>,
    microphone: Option<Arc<dyn Microphone>>,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    wakeword: Option<Arc<dyn WakewordLoader>>,
    registry: Option<ActionRegistry>,
    vehicle: Option<SharedVehicle>,
}

impl AssistantBuilder {
    pub fn new(config: CabinConfig) -> Self {
        Self {
            config,
            chat: None,
            microphone: None,
            stt: None,
            tts: None,
            wakeword: None,
            registry: None,
            vehicle: None,
        }
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_microphone(mut self, microphone: Arc<dyn Microphone>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn with_stt(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    pub fn with_tts(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    pub fn with_wakeword(mut self, loader: Arc<dyn WakewordLoader>) -> Self {
        self.wakeword = Some(loader);
        self
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_vehicle(mut self, vehicle: SharedVehicle) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    /// # Errors
    ///
    /// Returns an error if a default HTTP client cannot be constructed.
    pub fn build(self) -> Result<VoiceAssistant> {
        let config = self.config;
        let chat: Arc<dyn ChatClient> = match self.chat {
            Some(chat) => chat,
            None => Arc::new(ApiChat::new(&config.llm)?),
        };
        let stt: Arc<dyn SpeechToText> = match self.stt {
            Some(stt) => stt,
            None => Arc::new(HttpTranscriber::new(&config.stt)?),
        };
        let microphone = self
            .microphone
            .unwrap_or_else(|| Arc::new(CpalMicrophone::new(&config.audio)));
        let tts = self
            .tts
            .unwrap_or_else(|| speaker_from_config(&config.tts, &config.audio));
        let wakeword = self
            .wakeword
            .unwrap_or_else(|| Arc::new(ReferenceLoader::new(&config.wakeword)));
        let registry = Arc::new(self.registry.unwrap_or_default());
        let vehicle = self.vehicle.unwrap_or_default();
        let status = StatusBus::new(config.status.capacity, config.status.history);

        let processor = Arc::new(
            CommandProcessor::new(chat, registry, vehicle.clone())
                .with_system_prompt(config.llm.system_prompt.clone()),
        );

        let ctx = Arc::new(SessionContext {
            microphone,
            recorder: UtteranceRecorder::new(&config.capture),
            stt,
            processor,
            tts,
            vehicle,
            status,
        });
        let gate = SessionGate::new();
        let wake_loop = WakewordLoop::new(
            Arc::clone(&ctx),
            gate.clone(),
            wakeword,
            config.session.clone(),
            config.wakeword.threshold,
        );

        Ok(VoiceAssistant {
            ctx,
            gate,
            wake_loop,
            cancel: CancellationToken::new(),
        })
    }
}

/// The running assistant.
pub struct VoiceAssistant {
    ctx: Arc<SessionContext>,
    gate: SessionGate,
    wake_loop: WakewordLoop,
    cancel: CancellationToken,
}

impl VoiceAssistant {
    pub fn builder(config: CabinConfig) -> AssistantBuilder {
        AssistantBuilder::new(config)
    }

    /// Start wake-word detection. Returns `false` in text-only mode.
    pub fn start(&self) -> bool {
        self.wake_loop.start(&self.cancel)
    }

    /// Cancel the wake loop, any running session and pending typed commands
    /// at their next phase boundary, and wait for the wake loop to exit.
    pub async fn stop(&self) {
        info!("stopping assistant");
        self.cancel.cancel();
        self.wake_loop.shutdown().await;
    }

    /// Start a session without the wake word, as the dashboard's listen
    /// button does. Returns `None` if a session is already active.
    pub fn trigger_listen(&self) -> Option<JoinHandle<SessionOutcome>> {
        let Some(guard) = self.gate.try_begin() else {
            debug!("listen requested while a session is active, ignoring");
            return None;
        };
        Some(tokio::spawn(run_session(
            Arc::clone(&self.ctx),
            guard,
            SessionTrigger::Manual,
            self.cancel.child_token(),
        )))
    }

    /// Process typed text on its own task and speak the reply.
    ///
    /// Emits "Processing: <text>", "Thinking..." and "AI: <reply>". The
    /// reply is spoken with `ai_talking` set; a speech failure is reported
    /// as "TTS Failed: ..." and does not fail the command.
    pub fn submit_text(&self, text: impl Into<String>) -> JoinHandle<Result<CommandOutcome>> {
        let text = text.into();
        let ctx = Arc::clone(&self.ctx);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            ctx.status.emit(processing_status(&text));
            ctx.status.emit(STATUS_THINKING);
            let outcome = match ctx.processor.process(&text).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("typed command failed: {e}");
                    ctx.status.emit(format!("Error: {e}"));
                    return Err(e);
                }
            };
            ctx.status.emit(format!("AI: {}", outcome.reply));
            if !cancel.is_cancelled() {
                ctx.speak_or_report(&outcome.reply).await;
            }
            Ok(outcome)
        })
    }

    pub fn vehicle(&self) -> &SharedVehicle {
        &self.ctx.vehicle
    }

    pub fn snapshot(&self) -> VehicleState {
        self.ctx.vehicle.snapshot()
    }

    pub fn status(&self) -> &StatusBus {
        &self.ctx.status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.ctx.status.subscribe()
    }

    pub fn is_session_active(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn loop_state(&self) -> LoopState {
        self.wake_loop.state()
    }

    pub fn watch_loop_state(&self) -> tokio::sync::watch::Receiver<LoopState> {
        self.wake_loop.watch_state()
    }
}
