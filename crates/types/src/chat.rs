//! Strongly-typed inbound chat request.
//!
//! The proxy accepts a superset of the `OpenAI` chat-completions and Anthropic
//! Messages request bodies. Fields the proxy rewrites are typed; everything
//! else is captured in a catch-all map and forwarded verbatim.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn text_kind() -> String {
    "text".to_string()
}

/// One `{type, text}` entry of the `system` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type", default = "text_kind")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    /// Block attributes such as `cache_control`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SystemBlock {
    /// Creates a plain `{"type":"text","text":..}` block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: text_kind(),
            text: text.into(),
            extra: Map::new(),
        }
    }
}

/// The `system` field, which clients send either as a bare string or as an
/// array of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Normalizes the prompt to block form. An empty string yields no blocks.
    #[must_use]
    pub fn into_blocks(self) -> Vec<SystemBlock> {
        match self {
            Self::Text(t) if t.is_empty() => Vec::new(),
            Self::Text(t) => vec![SystemBlock::text(t)],
            Self::Blocks(b) => b,
        }
    }

    /// Text of the leading entry, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t.as_str()),
            Self::Blocks(b) => b.first().map(|blk| blk.text.as_str()),
        }
    }
}

/// An inbound chat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// The model identifier (e.g., `"claude-sonnet-4-5"`).
    pub model: String,
    /// The conversation messages.
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    /// Whether to use streaming SSE mode.
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// All remaining fields not captured above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagesRequest {
    /// Text of the leading system entry, if any.
    #[must_use]
    pub fn first_system_text(&self) -> Option<&str> {
        self.system.as_ref().and_then(SystemPrompt::first_text)
    }

    /// Reconstructs the full request body as a `serde_json::Value`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if an extra field cannot be encoded.
    pub fn to_body(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
