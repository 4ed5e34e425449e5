//! Vehicle actions and their registry.
//!
//! Each action is an [`ActionHandler`]: a canonical name, a set of aliases
//! that models tend to use instead, a JSON schema for the system prompt, and
//! an `execute` that validates every argument before touching the state.
//! The [`ActionRegistry`] resolves aliases once, then looks the canonical
//! name up in a typed table.

pub mod builtins;
pub mod registry;

pub use registry::{ActionRegistry, Dispatch};

use crate::vehicle::VehicleState;
use serde_json::{Map, Value};

/// Argument validation failure.
///
/// Handlers return this before mutating anything, so a rejected call leaves
/// the vehicle untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{action}: missing required argument '{argument}'")]
    MissingArgument {
        action: &'static str,
        argument: &'static str,
    },

    #[error("{action}: invalid value {value} for '{argument}' (expected {expected})")]
    InvalidArgument {
        action: &'static str,
        argument: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// A named operation on the vehicle.
pub trait ActionHandler: Send + Sync {
    /// Canonical name (e.g. `"set_ac"`).
    fn name(&self) -> &'static str;

    /// Alternative names that resolve to this handler (e.g. `"ac"`).
    fn aliases(&self) -> &'static [&'static str];

    /// One-line description for the system prompt.
    fn description(&self) -> &'static str;

    /// JSON schema of the argument object.
    fn schema(&self) -> Value;

    /// Validate `args`, apply the change, and return a confirmation sentence.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] when a required argument is missing or malformed.
    /// The state must not have been modified in that case.
    fn execute(&self, args: &Args<'_>, state: &mut VehicleState) -> Result<String, ActionError>;
}

/// Typed accessors over a tool call's argument object.
pub struct Args<'a> {
    action: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(action: &'static str, map: &'a Map<String, Value>) -> Self {
        Self { action, map }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn missing(&self, argument: &'static str) -> ActionError {
        ActionError::MissingArgument {
            action: self.action,
            argument,
        }
    }

    fn invalid(&self, argument: &'static str, value: &Value, expected: &'static str) -> ActionError {
        ActionError::InvalidArgument {
            action: self.action,
            argument,
            value: value.to_string(),
            expected,
        }
    }

    /// Required on/off switch. Accepts `"on"`/`"off"` in any case, plus
    /// JSON booleans, which some models emit instead.
    pub fn switch(&self, key: &'static str) -> Result<bool, ActionError> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => Ok(true),
                "off" | "false" | "no" => Ok(false),
                _ => Err(self.invalid(key, value, "\"on\" or \"off\"")),
            },
            _ => Err(self.invalid(key, value, "\"on\" or \"off\"")),
        }
    }

    /// Required non-empty string.
    pub fn text(&self, key: &'static str) -> Result<&'a str, ActionError> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        match value.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(self.invalid(key, value, "a non-empty string")),
        }
    }

    /// Optional integer looked up under the first present key.
    ///
    /// Floats are rounded and numeric strings (`"18"`) are parsed.
    pub fn optional_integer(&self, keys: &[&'static str]) -> Result<Option<i64>, ActionError> {
        let Some((key, value)) = keys.iter().find_map(|k| self.get(k).map(|v| (*k, v))) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(key, value, "a number"))
    }

    /// Required string restricted to `choices` (case-insensitive).
    ///
    /// Returns the matching entry from `choices`.
    pub fn choice(
        &self,
        key: &'static str,
        choices: &'static [&'static str],
        expected: &'static str,
    ) -> Result<&'static str, ActionError> {
        let value = self.get(key).ok_or_else(|| self.missing(key))?;
        let raw = value
            .as_str()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        choices
            .iter()
            .find(|c| **c == raw)
            .copied()
            .ok_or_else(|| self.invalid(key, value, expected))
    }
}
