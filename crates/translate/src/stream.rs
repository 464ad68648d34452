//! Incremental translation of the Anthropic Messages event stream into
//! `OpenAI` `chat.completion.chunk` frames.
//!
//! The upstream body arrives in arbitrary byte fragments. [`StreamTranslator`]
//! keeps the incomplete trailing line between calls, so feeding a stream in
//! one piece or byte by byte yields the same events.

use bytes::Bytes;
use serde_json::{Value, json};

/// One output frame for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatedEvent {
    Chunk(Value),
    Done,
}

impl TranslatedEvent {
    /// SSE wire form: `data: <json>\n\n` or `data: [DONE]\n\n`.
    #[must_use]
    pub fn to_sse_bytes(&self) -> Bytes {
        match self {
            Self::Chunk(v) => Bytes::from(format!("data: {v}\n\n")),
            Self::Done => Bytes::from_static(b"data: [DONE]\n\n"),
        }
    }
}

/// Per-request stream translation state.
#[derive(Debug)]
pub struct StreamTranslator {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no line break.
    scanned: usize,
    id: String,
    model: String,
    created: i64,
    /// Index of the most recently started tool call, or -1 before the first.
    tool_call_index: i64,
    /// Whether the current content block is a `tool_use` block.
    in_tool_use: bool,
    prompt_tokens: u64,
    emitted: u64,
    ended: bool,
}

impl StreamTranslator {
    /// `created` is the unix timestamp (seconds) stamped on every chunk.
    #[must_use]
    pub fn new(created: i64) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            id: "chatcmpl-claude".to_string(),
            model: "claude".to_string(),
            created,
            tool_call_index: -1,
            in_tool_use: false,
            prompt_tokens: 0,
            emitted: 0,
            ended: false,
        }
    }

    /// `true` once [`TranslatedEvent::Done`] has been produced.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Number of events produced so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Consume a fragment of the upstream body.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<TranslatedEvent> {
        let mut out = Vec::new();
        if self.ended {
            return out;
        }
        self.buf.extend_from_slice(fragment);
        while let Some(nl) = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| self.scanned + i)
        {
            let raw: Vec<u8> = self.buf.drain(..=nl).collect();
            self.scanned = 0;
            self.process_line(&raw, &mut out);
            if self.ended {
                self.buf.clear();
                break;
            }
        }
        self.scanned = self.buf.len();
        out
    }

    /// Signal that the upstream closed. Flushes a final unterminated line and
    /// emits `Done` unless it was already sent.
    pub fn finish(&mut self) -> Vec<TranslatedEvent> {
        let mut out = Vec::new();
        if self.ended {
            return out;
        }
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if !rest.is_empty() {
            self.process_line(&rest, &mut out);
        }
        if !self.ended {
            self.push(&mut out, TranslatedEvent::Done);
            self.ended = true;
        }
        out
    }

    fn process_line(&mut self, raw: &[u8], out: &mut Vec<TranslatedEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        match serde_json::from_str::<Value>(data.trim_start()) {
            Ok(ev) => self.process_event(&ev, out),
            Err(e) => tracing::debug!(error = %e, "skipping malformed stream event"),
        }
    }

    fn process_event(&mut self, ev: &Value, out: &mut Vec<TranslatedEvent>) {
        match ev["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(id) = ev.pointer("/message/id").and_then(Value::as_str) {
                    self.id = format!("chatcmpl-{id}");
                }
                if let Some(model) = ev.pointer("/message/model").and_then(Value::as_str) {
                    self.model = model.to_string();
                }
                self.prompt_tokens = ev
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let chunk = self.chunk(&json!({"role": "assistant", "content": ""}), None);
                self.push(out, TranslatedEvent::Chunk(chunk));
            }
            "content_block_start" => {
                let block_type = ev
                    .pointer("/content_block/type")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if block_type != "tool_use" {
                    self.in_tool_use = false;
                    return;
                }
                self.in_tool_use = true;
                self.tool_call_index += 1;
                let id = ev.pointer("/content_block/id").and_then(Value::as_str).unwrap_or("");
                let name = ev.pointer("/content_block/name").and_then(Value::as_str).unwrap_or("");
                let delta = json!({"tool_calls": [{
                    "index": self.tool_call_index,
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": ""}
                }]});
                let chunk = self.chunk(&delta, None);
                self.push(out, TranslatedEvent::Chunk(chunk));
            }
            "content_block_delta" => {
                let delta = match ev.pointer("/delta/type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = ev.pointer("/delta/text").and_then(Value::as_str).unwrap_or("");
                        json!({"content": text})
                    }
                    Some("thinking_delta") => {
                        let text = ev.pointer("/delta/thinking").and_then(Value::as_str).unwrap_or("");
                        json!({"reasoning_content": text})
                    }
                    Some("input_json_delta") if self.in_tool_use => {
                        let partial = ev
                            .pointer("/delta/partial_json")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        json!({"tool_calls": [{
                            "index": self.tool_call_index,
                            "function": {"arguments": partial}
                        }]})
                    }
                    _ => return,
                };
                let chunk = self.chunk(&delta, None);
                self.push(out, TranslatedEvent::Chunk(chunk));
            }
            "message_delta" => {
                let finish_reason = map_finish_reason(ev.pointer("/delta/stop_reason").and_then(Value::as_str));
                let mut chunk = self.chunk(&json!({}), Some(finish_reason));
                if let Some(output) = ev.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    chunk["usage"] = json!({
                        "prompt_tokens": self.prompt_tokens,
                        "completion_tokens": output,
                        "total_tokens": self.prompt_tokens + output
                    });
                }
                self.push(out, TranslatedEvent::Chunk(chunk));
            }
            "message_stop" => {
                self.push(out, TranslatedEvent::Done);
                self.ended = true;
            }
            "error" => {
                tracing::warn!(error = %ev["error"], "upstream stream reported an error");
            }
            _ => {}
        }
    }

    fn chunk(&self, delta: &Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": &self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": &self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason
            }]
        })
    }

    fn push(&mut self, out: &mut Vec<TranslatedEvent>, ev: TranslatedEvent) {
        self.emitted += 1;
        out.push(ev);
    }
}

/// Maps an Anthropic `stop_reason` to an `OpenAI` `finish_reason`.
pub(crate) fn map_finish_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4-5\",\"usage\":{\"input_tokens\":12}}}\n",
        "\n",
        "event: ping\n",
        "data: {\"type\":\"ping\"}\n",
        "\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Héllo\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
        "\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}\n",
        "\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":7}}\n",
        "\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n",
        "\n",
    );

    fn run_whole(input: &str) -> Vec<TranslatedEvent> {
        let mut t = StreamTranslator::new(42);
        let mut out = t.feed(input.as_bytes());
        out.extend(t.finish());
        out
    }

    fn delta(ev: &TranslatedEvent) -> &Value {
        match ev {
            TranslatedEvent::Chunk(v) => &v["choices"][0]["delta"],
            TranslatedEvent::Done => panic!("expected chunk"),
        }
    }

    #[test]
    fn test_full_stream_mapping() {
        let out = run_whole(STREAM);
        assert_eq!(out.len(), 7);

        let TranslatedEvent::Chunk(first) = &out[0] else { panic!() };
        assert_eq!(first["id"], "chatcmpl-msg_1");
        assert_eq!(first["model"], "claude-sonnet-4-5");
        assert_eq!(first["created"], 42);
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(delta(&out[0]), &json!({"role": "assistant", "content": ""}));

        assert_eq!(delta(&out[1]), &json!({"content": "Héllo"}));
        assert_eq!(
            delta(&out[2]),
            &json!({"tool_calls": [{"index": 0, "id": "toolu_1", "type": "function", "function": {"name": "get_weather", "arguments": ""}}]})
        );
        assert_eq!(delta(&out[3])["tool_calls"][0]["function"]["arguments"], "{\"city\":");
        assert_eq!(delta(&out[4])["tool_calls"][0]["function"]["arguments"], "\"Paris\"}");

        let TranslatedEvent::Chunk(last) = &out[5] else { panic!() };
        assert_eq!(last["choices"][0]["finish_reason"], "tool_calls");
        assert_eq!(last["usage"]["prompt_tokens"], 12);
        assert_eq!(last["usage"]["completion_tokens"], 7);
        assert_eq!(last["usage"]["total_tokens"], 19);

        assert_eq!(out[6], TranslatedEvent::Done);
    }

    #[test]
    fn test_byte_by_byte_matches_whole() {
        let whole = run_whole(STREAM);
        let mut t = StreamTranslator::new(42);
        let mut split = Vec::new();
        for b in STREAM.as_bytes() {
            split.extend(t.feed(std::slice::from_ref(b)));
        }
        split.extend(t.finish());
        assert_eq!(split, whole);
        assert_eq!(t.emitted(), 7);
    }

    #[test]
    fn test_arbitrary_split_points_match_whole() {
        let whole = run_whole(STREAM);
        let bytes = STREAM.as_bytes();
        for cut in [1, 7, 50, 133, bytes.len() / 2, bytes.len() - 3] {
            let mut t = StreamTranslator::new(42);
            let mut out = t.feed(&bytes[..cut]);
            out.extend(t.feed(&bytes[cut..]));
            out.extend(t.finish());
            assert_eq!(out, whole, "split at {cut}");
        }
    }

    #[test]
    fn test_crlf_lines() {
        let crlf = STREAM.replace('\n', "\r\n");
        assert_eq!(run_whole(&crlf), run_whole(STREAM));
    }

    #[test]
    fn test_done_emitted_once_and_input_ignored_after() {
        let mut t = StreamTranslator::new(0);
        let out = t.feed(b"data: {\"type\":\"message_stop\"}\n");
        assert_eq!(out, vec![TranslatedEvent::Done]);
        assert!(t.is_ended());
        assert!(t.feed(b"data: {\"type\":\"message_start\",\"message\":{}}\n").is_empty());
        assert!(t.finish().is_empty());
        assert_eq!(t.emitted(), 1);
    }

    #[test]
    fn test_finish_without_message_stop_emits_done() {
        let mut t = StreamTranslator::new(0);
        let out = t.feed(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"a\"}}\n");
        assert_eq!(out.len(), 1);
        assert_eq!(t.finish(), vec![TranslatedEvent::Done]);
        assert!(t.is_ended());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut t = StreamTranslator::new(0);
        assert!(t.feed(b"data: {\"type\":\"message_stop\"}").is_empty());
        assert_eq!(t.finish(), vec![TranslatedEvent::Done]);
    }

    #[test]
    fn test_malformed_and_unknown_events_skipped() {
        let mut t = StreamTranslator::new(0);
        let out = t.feed(
            b": comment\ndata: {not json\ndata: {\"type\":\"mystery\"}\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}\n",
        );
        assert!(out.is_empty());
        assert!(!t.is_ended());
    }

    #[test]
    fn test_thinking_delta() {
        let mut t = StreamTranslator::new(0);
        let out = t.feed(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n");
        assert_eq!(delta(&out[0]), &json!({"reasoning_content": "hmm"}));
    }

    #[test]
    fn test_input_json_outside_tool_block_ignored() {
        let mut t = StreamTranslator::new(0);
        let out = t.feed(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("end_turn")), "stop");
        assert_eq!(map_finish_reason(Some("stop_sequence")), "stop");
        assert_eq!(map_finish_reason(Some("max_tokens")), "length");
        assert_eq!(map_finish_reason(Some("tool_use")), "tool_calls");
        assert_eq!(map_finish_reason(None), "stop");
    }

    #[test]
    fn test_message_delta_carries_usage() {
        let mut t = StreamTranslator::new(0);
        t.feed(b"data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"usage\":{\"input_tokens\":3}}}\n");
        let out = t.feed(b"data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":5}}\n");
        let TranslatedEvent::Chunk(chunk) = &out[0] else { panic!("expected chunk") };
        assert_eq!(chunk["choices"][0]["finish_reason"], "length");
        assert_eq!(chunk["usage"], json!({"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}));

        let out = t.feed(b"data: {\"type\":\"message_delta\",\"delta\":{}}\n");
        let TranslatedEvent::Chunk(chunk) = &out[0] else { panic!("expected chunk") };
        assert!(chunk.get("usage").is_none());
    }

    #[test]
    fn test_long_event_in_small_fragments_scans_each_byte_once() {
        let text = "x".repeat(64 * 1024);
        let line = format!(
            "data: {{\"type\":\"content_block_delta\",\"delta\":{{\"type\":\"text_delta\",\"text\":\"{text}\"}}}}\n"
        );
        let bytes = line.as_bytes();
        let mut t = StreamTranslator::new(0);
        let mut out = Vec::new();
        for piece in bytes.chunks(16) {
            out.extend(t.feed(piece));
            if out.is_empty() {
                assert_eq!(t.scanned, t.buf.len());
            }
        }
        assert_eq!(out.len(), 1);
        assert_eq!(delta(&out[0])["content"].as_str().map(str::len), Some(text.len()));
        assert!(t.buf.is_empty());
        assert_eq!(t.scanned, 0);
    }

    #[test]
    fn test_sse_bytes() {
        assert_eq!(&TranslatedEvent::Done.to_sse_bytes()[..], b"data: [DONE]\n\n");
        let chunk = TranslatedEvent::Chunk(json!({"a": 1}));
        assert_eq!(&chunk.to_sse_bytes()[..], b"data: {\"a\":1}\n\n");
    }
}
