//! Action registry with alias resolution.
//!
//! The [`ActionRegistry`] holds handlers by canonical name and an alias
//! table mapping every accepted spelling to a canonical name. Lookups go
//! through the alias table exactly once, then hit the handler table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{ActionError, ActionHandler, Args};
use crate::tool_call::ToolCall;
use crate::vehicle::SharedVehicle;

/// Result of dispatching a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran and produced a confirmation.
    Executed {
        action: &'static str,
        confirmation: String,
    },
    /// No handler matches the requested name. Nothing was changed.
    Unknown { requested: String },
}

impl Dispatch {
    /// User-facing text for this outcome.
    pub fn message(&self) -> String {
        match self {
            Self::Executed { confirmation, .. } => confirmation.clone(),
            Self::Unknown { requested } => format!("unknown tool: {requested}"),
        }
    }
}

/// Registry of vehicle actions.
pub struct ActionRegistry {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
    aliases: HashMap<String, &'static str>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in vehicle actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for handler in super::builtins::all() {
            registry.register(handler);
        }
        registry
    }

    /// Register a handler under its name and aliases. Replaces any existing
    /// handler with the same canonical name; a later alias wins over an
    /// earlier one.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        let name = handler.name();
        self.aliases.insert(normalize(name), name);
        for alias in handler.aliases() {
            if let Some(previous) = self.aliases.insert(normalize(alias), name)
                && previous != name
            {
                warn!("alias '{alias}' moved from {previous} to {name}");
            }
        }
        self.handlers.insert(name, handler);
    }

    /// Canonical name for any accepted spelling.
    pub fn canonical_name(&self, requested: &str) -> Option<&'static str> {
        self.aliases.get(&normalize(requested)).copied()
    }

    /// Canonical names of all registered actions, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// JSON schema per action, sorted by name.
    ///
    /// Each entry contains `name`, `aliases`, `description` and `parameters`.
    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.names()
            .into_iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| {
                serde_json::json!({
                    "name": h.name(),
                    "aliases": h.aliases(),
                    "description": h.description(),
                    "parameters": h.schema(),
                })
            })
            .collect()
    }

    /// Resolve the call's action name and run its handler against `vehicle`.
    ///
    /// Validation and mutation happen inside one critical section, so
    /// observers never see a partially applied action.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when the handler rejects its arguments; the
    /// vehicle is unchanged in that case.
    pub fn dispatch(&self, call: &ToolCall, vehicle: &SharedVehicle) -> Result<Dispatch, ActionError> {
        let Some(handler) = self
            .canonical_name(&call.action)
            .and_then(|name| self.handlers.get(name))
        else {
            warn!(action = %call.action, "unknown tool requested");
            return Ok(Dispatch::Unknown {
                requested: call.action.clone(),
            });
        };

        let action = handler.name();
        let args = Args::new(action, &call.arguments);
        let confirmation = vehicle.update(|state| handler.execute(&args, state))?;
        info!(action, requested = %call.action, "action executed: {confirmation}");

        Ok(Dispatch::Executed {
            action,
            confirmation,
        })
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}
