//! Cabin: voice-driven command pipeline for a simulated vehicle.
//!
//! The assistant listens for a wake phrase, captures a spoken or typed
//! command, asks a language model to turn it into a tool call, executes the
//! call against a shared vehicle state and speaks the result:
//! Wake word → Microphone → STT → Chat API → Tool call → Action → TTS
//!
//! # Architecture
//!
//! - **Wake loop**: scores microphone audio with an MFCC/DTW spotter and
//!   starts at most one session at a time
//! - **Session**: capture → transcribe → dispatch → speak, with guaranteed
//!   release of the microphone and vehicle flags
//! - **Command processor**: single-turn chat request, tool-call resolution
//!   and dispatch through the action registry
//! - **Status bus**: ordered human-readable progress messages via
//!   `tokio::sync::broadcast`

pub mod actions;
pub mod assistant;
pub mod audio;
pub mod cabin_dirs;
pub mod command;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod status;
pub mod stt;
pub mod tool_call;
pub mod tts;
pub mod vehicle;
pub mod wake_loop;
pub mod wakeword;

pub use actions::{ActionError, ActionRegistry, Dispatch};
pub use assistant::{AssistantBuilder, VoiceAssistant};
pub use command::{CommandOutcome, CommandProcessor, OutcomeKind};
pub use config::CabinConfig;
pub use error::{CabinError, Result};
pub use session::{SessionGate, SessionOutcome, SessionPhase};
pub use status::{StatusBus, StatusEvent};
pub use tool_call::{Resolution, ToolCall};
pub use vehicle::{SharedVehicle, VehicleState};
pub use wake_loop::{LoopState, WakewordLoop};
