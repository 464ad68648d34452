//! Inbound request rewriting.
//!
//! Requests that do not already carry the CLI system prompt are rewritten so
//! the upstream accepts them as first-party CLI traffic: the CLI prompt is
//! prepended to `system`, `role: "system"` messages are folded into
//! `system`, and `max_tokens` is pinned to the model family's ceiling.
//! A request that already leads with the CLI prompt passes through
//! untouched, which makes the rewrite idempotent.

use serde_json::{Map, Value, json};
use subproxy_types::{MessagesRequest, SystemBlock};

/// The system prompt the upstream expects from its own CLI client.
pub const CLI_SYSTEM_PROMPT: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

/// The prompt editors send to verify an OpenAI-compatible key before use.
pub const CAPABILITY_PROBE_PROMPT: &str = "Test prompt using gpt-3.5-turbo";

/// `max_tokens` forced on rewritten opus requests.
pub const OPUS_MAX_TOKENS: u64 = 32_000;

/// `max_tokens` forced on rewritten sonnet requests.
pub const SONNET_MAX_TOKENS: u64 = 64_000;

const PROBE_RESPONSE_ID: &str = "chatcmpl-capability-probe";
const PROBE_RESPONSE_MODEL: &str = "gpt-3.5-turbo";
const PROBE_RESPONSE_CREATED: u64 = 1_700_000_000;
const PROBE_RESPONSE_TEXT: &str = "Capability check passed.";

/// Outcome of [`prepare`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// The request to forward upstream.
    pub request: MessagesRequest,
    /// Whether the request was rewritten; responses must then be converted
    /// back to the `OpenAI` format.
    pub disguised: bool,
    /// A response to return directly without contacting the upstream.
    pub bypass: Option<Value>,
}

/// Classify and rewrite an inbound request.
#[must_use]
pub fn prepare(request: MessagesRequest) -> Prepared {
    if is_capability_probe(&request) {
        return Prepared {
            request,
            disguised: false,
            bypass: Some(capability_probe_response()),
        };
    }
    let (request, disguised) = disguise(request);
    Prepared {
        request,
        disguised,
        bypass: None,
    }
}

/// `true` for the single-message key check editors send before enabling a
/// custom OpenAI base URL.
#[must_use]
pub fn is_capability_probe(request: &MessagesRequest) -> bool {
    if request.stream {
        return false;
    }
    let [only] = request.messages.as_slice() else {
        return false;
    };
    if only.get("role").and_then(Value::as_str) != Some("user") {
        return false;
    }
    match only.get("content") {
        Some(Value::String(s)) => s == CAPABILITY_PROBE_PROMPT,
        Some(Value::Array(parts)) => {
            matches!(parts.as_slice(), [part] if part.get("text").and_then(Value::as_str) == Some(CAPABILITY_PROBE_PROMPT))
        }
        _ => false,
    }
}

/// The fixed `chat.completion` answer to a capability probe.
#[must_use]
pub fn capability_probe_response() -> Value {
    json!({
        "id": PROBE_RESPONSE_ID,
        "object": "chat.completion",
        "created": PROBE_RESPONSE_CREATED,
        "model": PROBE_RESPONSE_MODEL,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": PROBE_RESPONSE_TEXT},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
    })
}

/// Apply the CLI rewrite. Returns the request and whether it changed.
#[must_use]
pub fn disguise(mut request: MessagesRequest) -> (MessagesRequest, bool) {
    if request.first_system_text() == Some(CLI_SYSTEM_PROMPT) {
        return (request, false);
    }

    let (system_messages, messages): (Vec<Value>, Vec<Value>) = std::mem::take(&mut request.messages)
        .into_iter()
        .partition(|m| m.get("role").and_then(Value::as_str) == Some("system"));
    request.messages = messages;

    let mut system = vec![SystemBlock::text(CLI_SYSTEM_PROMPT)];
    if let Some(original) = request.system.take() {
        system.extend(original.into_blocks());
    }
    for msg in &system_messages {
        system.extend(system_message_blocks(msg));
    }
    request.system = Some(subproxy_types::SystemPrompt::Blocks(system));

    if !request.metadata.as_ref().is_some_and(Value::is_object) {
        request.metadata = Some(Value::Object(Map::new()));
    }

    if let Some(cap) = max_tokens_for(&request.model) {
        request.max_tokens = Some(cap);
    }
    (request, true)
}

/// Output ceiling for rewritten requests to `model`, by family.
#[must_use]
pub fn max_tokens_for(model: &str) -> Option<u64> {
    if model.contains("sonnet") {
        Some(SONNET_MAX_TOKENS)
    } else if model.contains("opus") {
        Some(OPUS_MAX_TOKENS)
    } else {
        None
    }
}

fn system_message_blocks(msg: &Value) -> Vec<SystemBlock> {
    match msg.get("content") {
        Some(Value::String(s)) => vec![SystemBlock::text(s.as_str())],
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(SystemBlock::text(s.as_str())),
                _ => p.get("text").and_then(Value::as_str).map(SystemBlock::text),
            })
            .collect(),
        _ => vec![SystemBlock::text("")],
    }
}
