use serde::{Deserialize, Serialize};

use super::types::Usage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionStreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionStreamChoice {
    pub index: u32,
    pub delta: ChatCompletionStreamDelta,
    pub finish_reason: Option<String>,
}

/// A single `chat.completion.chunk` SSE data payload. Emitted verbatim for
/// OpenAI passthrough, and synthesized one per translated Anthropic event
/// (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
