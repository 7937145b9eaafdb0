use bytes::Bytes;
use gpool_common::{Money, Provider};
use gpool_protocol::{frame_anthropic, frame_openai, SseParser, OPENAI_DONE};
use serde_json::{json, Value};

use crate::context::UsageAccumulator;

/// Selected by the caller's route: same protocol in and out, or Anthropic
/// upstream translated into OpenAI-SSE downstream (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Passthrough,
    AnthropicToOpenAi,
}

/// `awaiting-start -> streaming -> closed` (spec.md §4.4, §REDESIGN FLAGS).
/// Field-overwrite semantics for `output_tokens`/`credits` are implemented
/// directly in `handle_anthropic_event` rather than tracked here; this enum
/// only gates whether a `message_start` has been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    AwaitingStart,
    Streaming,
    Closed,
}

/// Fan-in of an upstream SSE stream into client-bound frames, accumulating
/// usage as it goes. One instance per in-flight streaming request.
pub struct StreamBridge {
    provider: Provider,
    mode: BridgeMode,
    parser: SseParser,
    state: BridgeState,
    message_id: String,
    pub usage: UsageAccumulator,
}

impl StreamBridge {
    pub fn new(provider: Provider, mode: BridgeMode) -> Self {
        Self {
            provider,
            mode,
            parser: SseParser::new(),
            state: BridgeState::AwaitingStart,
            message_id: String::new(),
            usage: UsageAccumulator::default(),
        }
    }

    /// Feeds a chunk of upstream bytes in, returning zero or more
    /// client-bound frames (already terminated with the blank line SSE
    /// demands).
    pub fn push(&mut self, chunk: &Bytes) -> Vec<Bytes> {
        let events = self.parser.push_bytes(chunk);
        events.into_iter().flat_map(|event| self.handle_event(event.event.as_deref(), &event.data)).collect()
    }

    /// Flushes any buffered partial event and, for OpenAI-shaped output,
    /// appends the `[DONE]` sentinel.
    pub fn finish(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        for event in self.parser.finish() {
            out.extend(self.handle_event(event.event.as_deref(), &event.data));
        }
        self.state = BridgeState::Closed;
        if self.emits_openai_frames() {
            out.push(Bytes::from_static(OPENAI_DONE.as_bytes()));
        }
        out
    }

    fn emits_openai_frames(&self) -> bool {
        matches!(self.mode, BridgeMode::AnthropicToOpenAi) || (self.provider == Provider::OpenAi && self.mode == BridgeMode::Passthrough)
    }

    fn handle_event(&mut self, event_type: Option<&str>, data: &str) -> Vec<Bytes> {
        let Ok(parsed) = serde_json::from_str::<Value>(data) else {
            return Vec::new();
        };
        match (self.provider, self.mode) {
            (Provider::OpenAi, BridgeMode::Passthrough) => self.handle_openai_passthrough(data, &parsed),
            (Provider::Anthropic, BridgeMode::Passthrough) => self.handle_anthropic_passthrough(event_type, data, &parsed),
            (Provider::Anthropic, BridgeMode::AnthropicToOpenAi) => self.handle_anthropic_translated(event_type, &parsed),
            (Provider::OpenAi, BridgeMode::AnthropicToOpenAi) => unreachable!("openai upstream never translates to openai"),
        }
    }

    fn handle_openai_passthrough(&mut self, raw_data: &str, parsed: &Value) -> Vec<Bytes> {
        self.state = BridgeState::Streaming;
        if let Some(model) = parsed.get("model").and_then(Value::as_str) {
            self.usage.model.get_or_insert_with(|| model.to_string());
        }
        if let Some(content) = parsed.pointer("/choices/0/delta/content").and_then(Value::as_str) {
            self.usage.text.push_str(content);
        }
        if let Some(usage) = parsed.get("usage").filter(|u| !u.is_null()) {
            apply_openai_usage(&mut self.usage, usage);
        }
        vec![Bytes::from(frame_openai(raw_data))]
    }

    fn handle_anthropic_passthrough(&mut self, event_type: Option<&str>, raw_data: &str, parsed: &Value) -> Vec<Bytes> {
        self.apply_anthropic_accumulation(event_type, parsed);
        let event_type = event_type.unwrap_or("message");
        vec![Bytes::from(frame_anthropic(event_type, raw_data))]
    }

    fn handle_anthropic_translated(&mut self, event_type: Option<&str>, parsed: &Value) -> Vec<Bytes> {
        self.apply_anthropic_accumulation(event_type, parsed);
        let chunk = match event_type {
            Some("message_start") => openai_chunk(&self.message_id, self.usage.model.as_deref().unwrap_or("unknown"), json!({"role": "assistant"}), None, None),
            Some("content_block_delta") => {
                let text = parsed.pointer("/delta/text").and_then(Value::as_str).unwrap_or("");
                openai_chunk(&self.message_id, self.usage.model.as_deref().unwrap_or("unknown"), json!({"content": text}), None, None)
            }
            Some("message_delta") => {
                let stop_reason = parsed.pointer("/delta/stop_reason").and_then(Value::as_str);
                let finish_reason = stop_reason.map(translate_stop_reason);
                let usage = json!({
                    "prompt_tokens": self.usage.input_tokens,
                    "completion_tokens": self.usage.output_tokens,
                    "total_tokens": self.usage.input_tokens + self.usage.output_tokens,
                });
                openai_chunk(&self.message_id, self.usage.model.as_deref().unwrap_or("unknown"), json!({}), finish_reason, Some(usage))
            }
            _ => openai_chunk(&self.message_id, self.usage.model.as_deref().unwrap_or("unknown"), json!({}), None, None),
        };
        vec![Bytes::from(frame_openai(&chunk.to_string()))]
    }

    fn apply_anthropic_accumulation(&mut self, event_type: Option<&str>, parsed: &Value) {
        match event_type {
            Some("message_start") => {
                self.state = BridgeState::Streaming;
                if let Some(id) = parsed.pointer("/message/id").and_then(Value::as_str) {
                    self.message_id = id.to_string();
                }
                if let Some(model) = parsed.pointer("/message/model").and_then(Value::as_str) {
                    self.usage.model.get_or_insert_with(|| model.to_string());
                }
                if let Some(v) = parsed.pointer("/message/usage/input_tokens").and_then(Value::as_u64) {
                    self.usage.input_tokens = v as u32;
                }
                if let Some(v) = parsed.pointer("/message/usage/cache_creation_input_tokens").and_then(Value::as_u64) {
                    self.usage.cache_creation_input_tokens = v as u32;
                }
                if let Some(v) = parsed.pointer("/message/usage/cache_read_input_tokens").and_then(Value::as_u64) {
                    self.usage.cache_read_input_tokens = v as u32;
                }
            }
            Some("content_block_delta") => {
                if let Some(text) = parsed.pointer("/delta/text").and_then(Value::as_str) {
                    self.usage.text.push_str(text);
                }
            }
            Some("message_delta") => {
                // Overwrite, never add: these are cumulative snapshots, not deltas.
                if let Some(v) = parsed.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    self.usage.output_tokens = v as u32;
                }
                if let Some(v) = parsed.pointer("/usage/credits") {
                    self.usage.credits = money_from_json(v);
                }
            }
            _ => {}
        }
    }
}

fn apply_openai_usage(usage: &mut UsageAccumulator, upstream_usage: &Value) {
    if let Some(v) = upstream_usage.get("prompt_tokens").and_then(Value::as_u64) {
        usage.input_tokens = v as u32;
    }
    if let Some(v) = upstream_usage.get("completion_tokens").and_then(Value::as_u64) {
        usage.output_tokens = v as u32;
    }
    // Same custom billing field Anthropic carries on `usage`; both upstreams expose it here.
    if let Some(v) = upstream_usage.get("credits") {
        usage.credits = money_from_json(v);
    }
}

/// Reads a JSON number or string token straight into `Money` without ever
/// routing it through a binary float (spec.md §9: "money is never a binary
/// float ... parse from upstream as a string"). `serde_json::Number`'s
/// `Display` impl emits the original decimal token verbatim, so this is
/// lossless for both upstream shapes (`credits` arrives as either a bare
/// JSON number or a quoted string depending on provider).
fn money_from_json(value: &Value) -> Money {
    match value {
        Value::String(s) => Money::parse_or_zero(s),
        Value::Number(n) => Money::parse_or_zero(&n.to_string()),
        _ => Money::ZERO,
    }
}

fn translate_stop_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        _ => "stop",
    }
}

fn openai_chunk(id: &str, model: &str, delta: Value, finish_reason: Option<&str>, usage: Option<Value>) -> Value {
    let mut chunk = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    });
    if let Some(usage) = usage {
        chunk.as_object_mut().expect("constructed above").insert("usage".to_string(), usage);
    }
    chunk
}

/// Assembles a single buffered (non-streaming) response body from whatever
/// the dispatcher returned, per spec.md §4.4's non-stream case. Usage
/// fields absent from upstream are emitted as zero, never null.
pub fn buffer_openai_response(upstream_body: &Value) -> Value {
    let mut body = upstream_body.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.entry("object").or_insert_with(|| json!("chat.completion"));
        let usage = obj.entry("usage").or_insert_with(|| json!({}));
        if let Some(usage_obj) = usage.as_object_mut() {
            let prompt = usage_obj.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let completion = usage_obj.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
            usage_obj.entry("prompt_tokens").or_insert_with(|| json!(prompt));
            usage_obj.entry("completion_tokens").or_insert_with(|| json!(completion));
            usage_obj.insert("total_tokens".to_string(), json!(prompt + completion));
        }
    }
    body
}

/// Extracts usage (tokens, credits, model, and — for Anthropic — joined
/// text) from a single buffered upstream response body, for the non-stream
/// dispatch path. Mirrors `extract_tokens`/`extract_credits` from the
/// original service, which read the same `usage.credits` field from both
/// providers' response shapes.
pub fn extract_buffered_usage(provider: Provider, body: &Value) -> UsageAccumulator {
    let mut usage = UsageAccumulator::default();
    usage.model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let Some(upstream_usage) = body.get("usage") else {
        return usage;
    };
    match provider {
        Provider::OpenAi => apply_openai_usage(&mut usage, upstream_usage),
        Provider::Anthropic => {
            if let Some(v) = upstream_usage.get("input_tokens").and_then(Value::as_u64) {
                usage.input_tokens = v as u32;
            }
            if let Some(v) = upstream_usage.get("output_tokens").and_then(Value::as_u64) {
                usage.output_tokens = v as u32;
            }
            if let Some(v) = upstream_usage.get("cache_creation_input_tokens").and_then(Value::as_u64) {
                usage.cache_creation_input_tokens = v as u32;
            }
            if let Some(v) = upstream_usage.get("cache_read_input_tokens").and_then(Value::as_u64) {
                usage.cache_read_input_tokens = v as u32;
            }
            if let Some(v) = upstream_usage.get("credits") {
                usage.credits = money_from_json(v);
            }
            if let Some(text) = body.pointer("/content/0/text").and_then(Value::as_str) {
                usage.text.push_str(text);
            }
        }
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(event: Option<&str>, data: &str) -> Bytes {
        match event {
            Some(ev) => Bytes::from(format!("event: {ev}\ndata: {data}\n\n")),
            None => Bytes::from(format!("data: {data}\n\n")),
        }
    }

    #[test]
    fn anthropic_passthrough_reframes_and_accumulates() {
        let mut bridge = StreamBridge::new(Provider::Anthropic, BridgeMode::Passthrough);
        let start = sse(
            Some("message_start"),
            r#"{"message":{"id":"msg_1","model":"claude-3-5-sonnet-20241022","usage":{"input_tokens":10,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}"#,
        );
        let frames = bridge.push(&start);
        assert_eq!(frames.len(), 1);
        assert!(String::from_utf8_lossy(&frames[0]).starts_with("event: message_start\n"));
        assert_eq!(bridge.usage.input_tokens, 10);

        let delta = sse(Some("content_block_delta"), r#"{"delta":{"text":"hello"}}"#);
        bridge.push(&delta);
        assert_eq!(bridge.usage.text, "hello");

        let msg_delta = sse(Some("message_delta"), r#"{"usage":{"output_tokens":5,"credits":0.002}}"#);
        bridge.push(&msg_delta);
        assert_eq!(bridge.usage.output_tokens, 5);
        assert_eq!(bridge.usage.credits, Money::parse_or_zero("0.002"));

        // A second message_delta must overwrite, not add.
        let msg_delta_2 = sse(Some("message_delta"), r#"{"usage":{"output_tokens":8,"credits":"0.004"}}"#);
        bridge.push(&msg_delta_2);
        assert_eq!(bridge.usage.output_tokens, 8);
        assert_eq!(bridge.usage.credits, Money::parse_or_zero("0.004"));
    }

    #[test]
    fn money_from_json_reads_number_and_string_tokens_without_float_rounding() {
        assert_eq!(money_from_json(&json!(0.002)), Money::parse_or_zero("0.002"));
        assert_eq!(money_from_json(&json!("0.002")), Money::parse_or_zero("0.002"));
        assert_eq!(money_from_json(&Value::Null), Money::ZERO);
    }

    #[test]
    fn anthropic_to_openai_translates_chunks_and_finish_reason() {
        let mut bridge = StreamBridge::new(Provider::Anthropic, BridgeMode::AnthropicToOpenAi);
        let start = sse(Some("message_start"), r#"{"message":{"id":"msg_1","model":"claude-3-5-sonnet-20241022","usage":{"input_tokens":1}}}"#);
        let frames = bridge.push(&start);
        let text = String::from_utf8_lossy(&frames[0]);
        assert!(text.contains("\"role\":\"assistant\""));

        let delta = sse(Some("message_delta"), r#"{"delta":{"stop_reason":"max_tokens"},"usage":{"output_tokens":3}}"#);
        let frames = bridge.push(&delta);
        assert!(String::from_utf8_lossy(&frames[0]).contains("\"finish_reason\":\"length\""));

        let frames = bridge.finish();
        assert!(String::from_utf8_lossy(frames.last().unwrap()).contains("[DONE]"));
    }

    #[test]
    fn openai_passthrough_captures_final_usage_block() {
        let mut bridge = StreamBridge::new(Provider::OpenAi, BridgeMode::Passthrough);
        let chunk = sse(None, r#"{"model":"gpt-4o-mini","choices":[{"delta":{"content":"hi"}}]}"#);
        bridge.push(&chunk);
        let final_chunk = sse(None, r#"{"model":"gpt-4o-mini","choices":[{"delta":{}}],"usage":{"prompt_tokens":7,"completion_tokens":2}}"#);
        bridge.push(&final_chunk);
        assert_eq!(bridge.usage.text, "hi");
        assert_eq!(bridge.usage.input_tokens, 7);
        assert_eq!(bridge.usage.output_tokens, 2);

        let frames = bridge.finish();
        assert!(String::from_utf8_lossy(frames.last().unwrap()).contains("[DONE]"));
    }

    #[test]
    fn buffer_openai_response_zero_fills_usage() {
        let body = json!({"model": "gpt-4o-mini", "choices": []});
        let buffered = buffer_openai_response(&body);
        assert_eq!(buffered["usage"]["total_tokens"], json!(0));
        assert_eq!(buffered["object"], json!("chat.completion"));
    }
}
