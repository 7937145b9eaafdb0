use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use gpool_common::{ErrorTag, Provider};
use serde_json::{json, Map, Value};

const OPENAI_BASE: &str = "https://ampcode.com/api/provider/openai";
const ANTHROPIC_BASE: &str = "https://ampcode.com/api/provider/anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The per-credential bound UA is never read here — see spec.md §9's
/// documented quirk. This hard-coded value is sent on every call instead.
const FIXED_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to build upstream client: {0}")]
    ClientBuild(String),
    #[error("upstream call failed: {0}")]
    Transport(String),
}

static CLIENT_CACHE: OnceLock<Mutex<HashMap<Option<String>, wreq::Client>>> = OnceLock::new();

/// Builds (or reuses) a provider-agnostic HTTP client for the given egress
/// proxy. Grounded on the teacher's `client_for_ctx`/`build_client` in
/// `gproxy-provider-impl/src/providers/http_client.rs`; simplified since
/// this gateway only ever needs one client shape.
fn client_for_proxy(proxy: Option<&str>) -> Result<wreq::Client, DispatchError> {
    let key = proxy.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().map_err(|_| DispatchError::ClientBuild("client cache lock poisoned".to_string()))?;
    if let Some(client) = guard.get(&key) {
        return Ok(client.clone());
    }

    let mut builder = wreq::Client::builder().connect_timeout(CONNECT_TIMEOUT).timeout(OVERALL_TIMEOUT);
    if let Some(proxy_url) = &key {
        builder = builder.proxy(wreq::Proxy::all(proxy_url).map_err(|err| DispatchError::ClientBuild(err.to_string()))?);
    }
    let client = builder.build().map_err(|err| DispatchError::ClientBuild(err.to_string()))?;
    guard.insert(key, client.clone());
    Ok(client)
}

fn base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => OPENAI_BASE,
        Provider::Anthropic => ANTHROPIC_BASE,
    }
}

/// Maps the internal OpenAI-shaped request body into the exact JSON
/// forwarded upstream (spec.md §4.3 step 4). Only non-null optional fields
/// are attached.
pub fn map_openai_body(body: &gpool_protocol::openai::CreateChatCompletionRequestBody) -> Value {
    let mut map = Map::new();
    map.insert("model".to_string(), json!(body.model));
    map.insert(
        "messages".to_string(),
        json!(body.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>()),
    );
    map.insert("stream".to_string(), json!(body.stream.unwrap_or(false)));
    if let Some(v) = body.max_tokens {
        map.insert("max_tokens".to_string(), json!(v));
    }
    if let Some(v) = body.temperature {
        map.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = body.top_p {
        map.insert("top_p".to_string(), json!(v));
    }
    if let Some(v) = body.n {
        map.insert("n".to_string(), json!(v));
    }
    if let Some(stop) = &body.stop {
        map.insert("stop".to_string(), serde_json::to_value(stop).unwrap_or(Value::Null));
    }
    if let Some(v) = body.presence_penalty {
        map.insert("presence_penalty".to_string(), json!(v));
    }
    if let Some(v) = body.frequency_penalty {
        map.insert("frequency_penalty".to_string(), json!(v));
    }
    if let Some(v) = &body.logit_bias {
        map.insert("logit_bias".to_string(), v.clone());
    }
    if let Some(v) = &body.user {
        map.insert("user".to_string(), json!(v));
    }
    Value::Object(map)
}

/// Maps the internal Anthropic-shaped request body (spec.md §4.3 step 4):
/// messages restricted to `{role, content}`, `max_tokens` default 4096,
/// `stop` -> `stop_sequences` (singleton wrapped).
pub fn map_anthropic_body(body: &gpool_protocol::anthropic::CreateMessageRequestBody) -> Value {
    let mut map = Map::new();
    map.insert("model".to_string(), json!(body.model));
    map.insert(
        "messages".to_string(),
        json!(body.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>()),
    );
    map.insert("max_tokens".to_string(), json!(body.max_tokens));
    map.insert("stream".to_string(), json!(body.stream.unwrap_or(false)));
    if let Some(v) = &body.system {
        map.insert("system".to_string(), json!(v));
    }
    if let Some(v) = body.temperature {
        map.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = body.top_p {
        map.insert("top_p".to_string(), json!(v));
    }
    if let Some(sequences) = &body.stop_sequences {
        map.insert("stop_sequences".to_string(), json!(sequences));
    }
    Value::Object(map)
}

/// Maps an OpenAI-shaped inbound request onto the Anthropic upstream shape,
/// for the cross-protocol translation path (spec.md §8 scenario 3: a
/// `claude-*` model requested through `/v1/chat/completions`). Same field
/// mapping as `map_anthropic_body`, just sourced from the OpenAI request
/// struct — `n`, `logit_bias`, `presence_penalty`, `frequency_penalty` have
/// no Anthropic equivalent and are dropped.
pub fn map_openai_request_as_anthropic_body(body: &gpool_protocol::openai::CreateChatCompletionRequestBody) -> Value {
    let mut map = Map::new();
    map.insert("model".to_string(), json!(body.model));
    map.insert(
        "messages".to_string(),
        json!(body.messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>()),
    );
    map.insert("max_tokens".to_string(), json!(body.max_tokens.unwrap_or(4096)));
    map.insert("stream".to_string(), json!(body.stream.unwrap_or(false)));
    if let Some(v) = body.temperature {
        map.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = body.top_p {
        map.insert("top_p".to_string(), json!(v));
    }
    if let Some(stop) = &body.stop {
        let sequences = stop.clone().into_sequences();
        if !sequences.is_empty() {
            map.insert("stop_sequences".to_string(), json!(sequences));
        }
    }
    Value::Object(map)
}

/// Fixed headers attached on every upstream call (spec.md §4.3 step 3).
fn fixed_headers(provider: Provider, secret: &str) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("x-amp-feature", "chat".to_string()),
        ("accept-language", "zh-CN,zh;q=0.9,en;q=0.8".to_string()),
        ("user-agent", FIXED_USER_AGENT.to_string()),
    ];
    match provider {
        Provider::OpenAi => headers.push(("authorization", format!("Bearer {secret}"))),
        Provider::Anthropic => {
            headers.push(("x-api-key", secret.to_string()));
            headers.push(("anthropic-version", ANTHROPIC_VERSION.to_string()));
        }
    }
    headers
}

/// Issues the upstream call and returns the raw response for the caller
/// (buffered handler or streaming bridge) to consume. Internal retries are
/// never performed (spec.md §4.3 step 5).
pub async fn send(
    provider: Provider,
    secret: &str,
    egress_proxy: Option<&str>,
    body: Value,
) -> Result<wreq::Response, DispatchError> {
    let client = client_for_proxy(egress_proxy)?;
    let path = match provider {
        Provider::OpenAi => "/v1/chat/completions",
        Provider::Anthropic => "/v1/messages",
    };
    let url = format!("{}{}", base_url(provider), path);
    let mut request = client.post(&url).json(&body);
    for (name, value) in fixed_headers(provider, secret) {
        request = request.header(name, value);
    }
    request.send().await.map_err(|err| DispatchError::Transport(err.to_string()))
}

/// Classifies an upstream error message against the pattern table in
/// spec.md §4.3 step 7 (case-insensitive substring match). Grounded on
/// `original_source/src/service/api_service.py`'s lower-cased substring
/// checks.
pub fn classify_error(message: &str) -> ErrorTag {
    let lower = message.to_ascii_lowercase();
    let has_any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if has_any(&["unauthorized", "401", "authentication", "invalid api key", "invalid_api_key"]) {
        ErrorTag::AuthError
    } else if has_any(&["rate limit", "429"]) {
        ErrorTag::RateLimitError
    } else if has_any(&["insufficient", "quota", "balance"]) {
        ErrorTag::QuotaError
    } else if has_any(&["timeout"]) {
        ErrorTag::TimeoutError
    } else if has_any(&["connection", "connect"]) {
        ErrorTag::ConnectionError
    } else if has_any(&["404", "not found"]) {
        ErrorTag::NotFoundError
    } else if has_any(&["500", "502", "503", "server error"]) {
        ErrorTag::ServerError
    } else {
        ErrorTag::OtherError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_errors() {
        assert!(matches!(classify_error("Error: Unauthorized, invalid api key"), ErrorTag::AuthError));
        assert!(matches!(classify_error("HTTP 401"), ErrorTag::AuthError));
    }

    #[test]
    fn classifies_rate_limit() {
        assert!(matches!(classify_error("Rate limit exceeded"), ErrorTag::RateLimitError));
        assert!(matches!(classify_error("429 Too Many Requests"), ErrorTag::RateLimitError));
    }

    #[test]
    fn classifies_quota_and_timeout_and_connection() {
        assert!(matches!(classify_error("Insufficient balance"), ErrorTag::QuotaError));
        assert!(matches!(classify_error("request timeout"), ErrorTag::TimeoutError));
        assert!(matches!(classify_error("connection refused"), ErrorTag::ConnectionError));
    }

    #[test]
    fn falls_back_to_other() {
        assert!(matches!(classify_error("something weird happened"), ErrorTag::OtherError));
    }

    #[test]
    fn maps_anthropic_stop_to_stop_sequences() {
        let body = gpool_protocol::anthropic::CreateMessageRequestBody {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![gpool_protocol::anthropic::MessageParam { role: "user".to_string(), content: "hi".to_string() }],
            max_tokens: 16,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: Some(vec!["STOP".to_string()]),
            stream: Some(true),
            metadata: None,
            api_key: None,
            proxy: None,
        };
        let mapped = map_anthropic_body(&body);
        assert_eq!(mapped["stop_sequences"], json!(["STOP"]));
        assert_eq!(mapped["max_tokens"], json!(16));
    }
}
