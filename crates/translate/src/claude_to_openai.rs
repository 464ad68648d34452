//! Translates complete Anthropic Messages responses into `OpenAI` format.

use crate::stream::map_finish_reason;
use serde_json::{Value, json};

/// Translator from an Anthropic `message` object to an `OpenAI` `chat.completion`.
pub struct AnthropicToOpenAI;

impl AnthropicToOpenAI {
    /// Convert `res`, stamping `created` (unix seconds) on the result.
    ///
    /// Text blocks are concatenated into `message.content`; `tool_use` blocks
    /// become `message.tool_calls` with their input re-encoded as a JSON string.
    #[must_use]
    pub fn translate_response(&self, res: &Value, created: i64) -> Value {
        let blocks = res.get("content").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => text.push_str(block.get("text").and_then(Value::as_str).unwrap_or("")),
                Some("thinking") => {
                    reasoning.push_str(block.get("thinking").and_then(Value::as_str).unwrap_or(""));
                }
                Some("tool_use") => {
                    let arguments = block.get("input").map_or_else(|| "{}".to_string(), Value::to_string);
                    tool_calls.push(json!({
                        "id": block.get("id").and_then(Value::as_str).unwrap_or(""),
                        "type": "function",
                        "function": {
                            "name": block.get("name").and_then(Value::as_str).unwrap_or(""),
                            "arguments": arguments,
                        }
                    }));
                }
                _ => {}
            }
        }

        let mut message = json!({"role": "assistant", "content": text});
        if !reasoning.is_empty() {
            message["reasoning_content"] = Value::String(reasoning);
        }
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }

        let finish_reason = map_finish_reason(res.get("stop_reason").and_then(Value::as_str));

        let model = res.get("model").and_then(Value::as_str).unwrap_or("unknown");

        let id = res
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| "chatcmpl-unknown".to_string(), |s| format!("chatcmpl-{s}"));

        let prompt_tokens = res
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion_tokens = res
            .pointer("/usage/output_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        json!({
            "id": id,
            "object": "chat.completion",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason
            }],
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
                "total_tokens": prompt_tokens + completion_tokens
            }
        })
    }
}
