use serde::{Deserialize, Serialize};

use super::types::{StopReason, Usage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: String,
    pub model: String,
    pub role: &'static str,
    pub content: Vec<serde_json::Value>,
    #[serde(rename = "type")]
    pub object: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlockDeltaText {
    #[serde(rename = "type")]
    pub delta_type: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeltaPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// The tagged union of Anthropic SSE event payloads the bridge needs to
/// read (for translation) or pass through verbatim (native streaming).
/// Anything not modeled here is forwarded as an opaque JSON value so
/// passthrough never drops an unrecognized event (spec.md §4.4 names only
/// the four kinds the translation table covers; the bridge must still relay
/// everything else for native-protocol clients).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart { message: StreamMessage },
    ContentBlockStart { index: u32, content_block: serde_json::Value },
    ContentBlockDelta { index: u32, delta: ContentBlockDeltaText },
    ContentBlockStop { index: u32 },
    MessageDelta { delta: MessageDeltaPayload, usage: Usage },
    MessageStop,
    Ping,
}
