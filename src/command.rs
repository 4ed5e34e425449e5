//! Text command processing: chat API → tool call resolution → dispatch.
//!
//! [`CommandProcessor`] is shared by the voice session and the typed-input
//! path. Each call is a single-turn request (system prompt + user text); no
//! history is kept between calls. Calls are serialized behind one async
//! mutex, so a typed command and a voice command never interleave their
//! model requests or dispatches.

use crate::actions::{ActionRegistry, Dispatch};
use crate::error::{CabinError, Result};
use crate::llm::{ChatClient, ChatMessage};
use crate::tool_call::{self, Resolution};
use crate::vehicle::SharedVehicle;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Reply used whenever the chat API cannot be reached or answers with an error.
pub const FALLBACK_REPLY: &str = "I'm having trouble connecting to my local reasoning service.";

/// Reply used when the model answers with nothing at all.
pub const EMPTY_REPLY: &str = "Sorry, I don't have an answer for that.";

const PROMPT_PREAMBLE: &str = "You are a car assistant. You can control the vehicle with these tools:";

const PROMPT_FORMAT: &str = "\
When the user asks for an action, respond ONLY with a JSON object like:
{\"tool\": \"ac\", \"args\": {\"on\": \"on\", \"temperature\": 22}}
{\"tool\": \"lights\", \"args\": {\"on\": \"off\"}}
{\"tool\": \"wipers\", \"args\": {\"on\": \"on\"}}
{\"tool\": \"nav\", \"args\": {\"destination\": \"Home\"}}
{\"tool\": \"stop_navigation\", \"args\": {}}
{\"tool\": \"window\", \"args\": {\"window\": \"all\", \"action\": \"open\"}}

If it's just a question, reply normally in one or two short sentences.";

/// What kind of result a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// An action ran against the vehicle.
    Action(&'static str),
    /// The model asked for an action that does not exist.
    UnknownAction(String),
    /// The model answered conversationally.
    Conversation,
    /// The chat API failed; the reply is [`FALLBACK_REPLY`].
    ProviderUnavailable,
}

/// Reply text plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub reply: String,
    pub kind: OutcomeKind,
}

/// Turns text into an executed action and a confirmation string.
pub struct CommandProcessor {
    chat: Arc<dyn ChatClient>,
    registry: Arc<ActionRegistry>,
    vehicle: SharedVehicle,
    system_prompt: String,
    turn: Mutex<()>,
}

impl CommandProcessor {
    /// Create a processor using the prompt generated from `registry`.
    pub fn new(chat: Arc<dyn ChatClient>, registry: Arc<ActionRegistry>, vehicle: SharedVehicle) -> Self {
        let system_prompt = default_system_prompt(&registry);
        Self {
            chat,
            registry,
            vehicle,
            system_prompt,
            turn: Mutex::new(()),
        }
    }

    /// Replace the system prompt. Empty strings keep the generated prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.system_prompt = prompt;
        }
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn vehicle(&self) -> &SharedVehicle {
        &self.vehicle
    }

    /// Process one command.
    ///
    /// Chat API failures never escape: they produce [`FALLBACK_REPLY`].
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Pipeline` for empty input and `CabinError::Action`
    /// when the requested action rejects its arguments.
    pub async fn process(&self, text: &str) -> Result<CommandOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CabinError::Pipeline("empty command".into()));
        }

        let _turn = self.turn.lock().await;
        info!("processing command: {text}");

        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ];
        let raw = match self.chat.chat(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("chat API failed: {e}");
                return Ok(CommandOutcome {
                    reply: FALLBACK_REPLY.to_owned(),
                    kind: OutcomeKind::ProviderUnavailable,
                });
            }
        };

        match tool_call::resolve(&raw) {
            Resolution::Reply(reply) if reply.is_empty() => Ok(CommandOutcome {
                reply: EMPTY_REPLY.to_owned(),
                kind: OutcomeKind::Conversation,
            }),
            Resolution::Reply(reply) => Ok(CommandOutcome {
                reply,
                kind: OutcomeKind::Conversation,
            }),
            Resolution::Call(call) => {
                info!(tool = %call.action, args = ?call.arguments, "model requested tool");
                let dispatch = self.registry.dispatch(&call, &self.vehicle)?;
                let reply = dispatch.message();
                let kind = match dispatch {
                    Dispatch::Executed { action, .. } => OutcomeKind::Action(action),
                    Dispatch::Unknown { requested } => OutcomeKind::UnknownAction(requested),
                };
                Ok(CommandOutcome { reply, kind })
            }
        }
    }
}

/// System prompt listing every registered action and the reply format.
pub fn default_system_prompt(registry: &ActionRegistry) -> String {
    let mut prompt = String::from(PROMPT_PREAMBLE);
    prompt.push('\n');
    for schema in registry.schemas() {
        let name = schema["name"].as_str().unwrap_or_default();
        let description = schema["description"].as_str().unwrap_or_default();
        let aliases: Vec<&str> = schema["aliases"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        let params = schema["parameters"]["properties"]
            .as_object()
            .map(|p| p.keys().map(String::as_str).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();

        prompt.push_str(&format!("- {name}"));
        if !aliases.is_empty() {
            prompt.push_str(&format!(" (also \"{}\")", aliases.join("\", \"")));
        }
        prompt.push_str(&format!(": {description}."));
        if !params.is_empty() {
            prompt.push_str(&format!(" Arguments: {params}."));
        }
        prompt.push('\n');
    }
    prompt.push('\n');
    prompt.push_str(PROMPT_FORMAT);
    prompt
}
