use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, OpaqueJson, StopConfiguration};

/// `POST /v1/chat/completions` request body (spec.md §6). Only the fields
/// the dispatcher forwards or validates are modeled; anything else upstream
/// accepts is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatCompletionRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Range 0..=2 (spec.md §4.8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Range 0..=1 (spec.md §4.8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Range 1..=10 (spec.md §4.8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopConfiguration>,
    /// Range -2..=2 (spec.md §4.8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Range -2..=2 (spec.md §4.8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<OpaqueJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Client-supplied credential; bypasses the pool when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Client-supplied egress proxy override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateChatCompletionRequest {
    pub body: CreateChatCompletionRequestBody,
}
