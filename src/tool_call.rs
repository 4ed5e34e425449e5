//! Extraction of structured tool calls from free-form model output.
//!
//! Small local models do not reliably answer with bare JSON: the call may be
//! wrapped in markdown fences, preceded by a sentence, or followed by an
//! explanation. This is a deliberately permissive heuristic, not a protocol
//! parser:
//!
//! 1. fence markers (```` ```json ```` and bare ```` ``` ````) are removed;
//! 2. the span from the first `{` to the last `}` is taken as the candidate;
//! 3. the candidate must be an object naming the action under `action` or
//!    `tool`, with arguments under `arguments` or `args`. Both keys are
//!    required; argument-less actions are written with `"args": {}`.
//!
//! Anything else is a conversational reply, which is a valid outcome.

use serde_json::{Map, Value};

/// Keys accepted for the action name, in priority order.
const NAME_KEYS: [&str; 2] = ["action", "tool"];
/// Keys accepted for the argument object, in priority order.
const ARG_KEYS: [&str; 2] = ["arguments", "args"];

/// A structured request to run one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Action name exactly as the model wrote it (alias resolution happens
    /// in the registry).
    pub action: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(action: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            action: action.into(),
            arguments,
        }
    }
}

/// What the model's reply turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A structured tool call to dispatch.
    Call(ToolCall),
    /// Plain conversational text to show and speak as-is.
    Reply(String),
}

/// Resolve a raw model reply into a tool call or a plain reply.
pub fn resolve(raw: &str) -> Resolution {
    let cleaned = strip_code_fences(raw);
    match json_span(&cleaned).and_then(parse_call) {
        Some(call) => Resolution::Call(call),
        None => Resolution::Reply(raw.trim().to_owned()),
    }
}

/// Remove markdown fence markers, keeping the fenced content.
///
/// Handles both language-tagged (```` ```json ````) and bare fences anywhere
/// in the text.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        // A language tag directly follows an opening fence: ```json
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let tag_ends_line =
            tag_len == rest.len() || rest[tag_len..].starts_with(['\n', '\r', ' ', '{']);
        if tag_len > 0 && tag_ends_line {
            rest = &rest[tag_len..];
        }
    }
    out.push_str(rest);
    out
}

/// Greedy span from the first `{` to the last `}`.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn parse_call(candidate: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    let action = NAME_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())?;

    let arguments = match ARG_KEYS.iter().find_map(|key| object.get(*key)) {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) => Map::new(),
        _ => return None,
    };

    Some(ToolCall::new(action, arguments))
}
