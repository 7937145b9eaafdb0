use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use gpool_common::{ErrorCode, ErrorTag, Provider};
use gpool_protocol::{anthropic, openai};
use http::{HeaderMap, StatusCode};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::authorize;
use crate::config::ConfigSnapshot;
use crate::context::RequestContext;
use crate::dispatch::{self, DispatchError};
use crate::error::ApiError;
use crate::logwriter::{build_record, LogWriter};
use crate::pool::{KeyPool, PooledCredential, Selection};
use crate::stream::{buffer_openai_response, extract_buffered_usage, BridgeMode, StreamBridge};
use crate::validate::{validate_request, ValidatedMessage};

/// Everything a route handler needs: the live config snapshot, the
/// credential pool, and the log writer. One instance is shared (via
/// `axum::extract::State`) across every request.
pub struct AppState<S: gpool_storage::CredentialStore> {
    pub config: Arc<ConfigSnapshot>,
    pub pool: Arc<KeyPool<S>>,
    pub log_writer: Arc<LogWriter>,
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /v1/models` — content-negotiated per spec.md §6.
pub async fn list_models<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Response {
    let config = state.config.pool();
    if wants_anthropic_models(&headers) {
        let mut models: Vec<&String> = config.anthropic_models.iter().collect();
        models.sort();
        let data: Vec<Value> = models
            .iter()
            .map(|id| json!({"created_at": "1970-01-01T00:00:00Z", "display_name": id, "id": id, "type": "model"}))
            .collect();
        let first_id = models.first().map(|s| s.as_str());
        let last_id = models.last().map(|s| s.as_str());
        return Json(json!({"data": data, "has_more": false, "first_id": first_id, "last_id": last_id})).into_response();
    }

    let mut models: Vec<&String> = config.openai_models.iter().chain(config.anthropic_models.iter()).collect();
    models.sort();
    let created = time::OffsetDateTime::now_utc().unix_timestamp();
    let data: Vec<Value> = models.iter().map(|id| json!({"id": id, "object": "model", "created": created, "owned_by": "gpool"})).collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

fn wants_anthropic_models(headers: &HeaderMap) -> bool {
    if headers.contains_key("anthropic-version") {
        return true;
    }
    headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| {
            let lower = ua.to_ascii_lowercase();
            lower.contains("anthropic") || lower.contains("claude")
        })
        .unwrap_or(false)
}

/// `POST /v1/chat/completions` — spec.md §6. Dispatches to the OpenAI
/// upstream natively, or to the Anthropic upstream with cross-protocol
/// translation when the model resolves to `claude-*` (spec.md §8 scenario 3).
pub async fn chat_completions<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<openai::CreateChatCompletionRequestBody>,
) -> Response {
    let system = state.config.system();
    let messages: Vec<ValidatedMessage<'_>> = body.messages.iter().map(|m| ValidatedMessage { role: &m.role, content: &m.content }).collect();
    let provider = match validate_request(
        &state.config.pool(),
        &body.model,
        &messages,
        body.temperature,
        body.top_p,
        body.n,
        body.presence_penalty,
        body.frequency_penalty,
        body.max_tokens,
    ) {
        Ok(provider) => provider,
        Err(err) => return api_error_response(err),
    };
    if let Err(err) = authorize(&headers, system.api_secret.as_deref().unwrap_or(""), provider) {
        return api_error_response(err);
    }

    let trace_id = Uuid::new_v4().to_string();
    let is_stream = body.stream.unwrap_or(false);
    let mut ctx = RequestContext::new(trace_id.clone(), provider, is_stream, body.model.clone());

    let selection = match state.pool.select_for(body.api_key.clone()).await {
        Ok(selection) => selection,
        Err(error) => {
            warn!(%trace_id, %error, event = "credential_store_error");
            return api_error_response(ApiError::no_credential(provider));
        }
    };
    let Some(credential) = apply_selection(&mut ctx, selection, body.proxy.clone()) else {
        finish_without_dispatch(&state, ctx, StatusCode::SERVICE_UNAVAILABLE, ErrorTag::NoCredentialError, "no eligible credential available");
        return api_error_response(ApiError::no_credential(provider));
    };

    let upstream_body = match provider {
        Provider::OpenAi => dispatch::map_openai_body(&body),
        Provider::Anthropic => dispatch::map_openai_request_as_anthropic_body(&body),
    };

    info!(%trace_id, %provider, model = %body.model, is_stream, event = "request_received");

    let response = match dispatch::send(provider, &ctx.secret.clone().unwrap_or_default(), ctx.egress_proxy.as_deref(), upstream_body).await {
        Ok(response) => response,
        Err(error) => return handle_dispatch_error(&state, ctx, &credential, provider, error).await,
    };

    let status = response.status();
    if !status.is_success() {
        return handle_upstream_error_body(&state, ctx, &credential, provider, status, response).await;
    }
    ctx.http_status_code = Some(status.as_u16() as i32);

    let mode = if provider == Provider::Anthropic { BridgeMode::AnthropicToOpenAi } else { BridgeMode::Passthrough };
    if is_stream {
        stream_response(state, ctx, provider, mode, response, "text/event-stream")
    } else {
        buffered_openai_response(state, ctx, provider, response).await
    }
}

/// `POST /v1/messages` — spec.md §6, Anthropic-native. Cross-direction
/// translation (an OpenAI-resolved model through this endpoint) is not
/// implemented; see DESIGN.md's open-question decision.
pub async fn messages<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<anthropic::CreateMessageRequestBody>,
) -> Response {
    let system = state.config.system();
    let messages: Vec<ValidatedMessage<'_>> = body.messages.iter().map(|m| ValidatedMessage { role: &m.role, content: &m.content }).collect();
    let provider = match validate_request(
        &state.config.pool(),
        &body.model,
        &messages,
        body.temperature,
        body.top_p,
        None,
        None,
        None,
        Some(body.max_tokens),
    ) {
        Ok(provider) => provider,
        Err(err) => return api_error_response(err),
    };
    if let Err(err) = authorize(&headers, system.api_secret.as_deref().unwrap_or(""), provider) {
        return api_error_response(err);
    }
    if provider != Provider::Anthropic {
        return api_error_response(ApiError::validation(Some(provider), "model must resolve to the anthropic provider for this endpoint"));
    }

    let trace_id = Uuid::new_v4().to_string();
    let is_stream = body.stream.unwrap_or(false);
    let mut ctx = RequestContext::new(trace_id.clone(), provider, is_stream, body.model.clone());

    let selection = match state.pool.select_for(body.api_key.clone()).await {
        Ok(selection) => selection,
        Err(error) => {
            warn!(%trace_id, %error, event = "credential_store_error");
            return api_error_response(ApiError::no_credential(provider));
        }
    };
    let Some(credential) = apply_selection(&mut ctx, selection, body.proxy.clone()) else {
        finish_without_dispatch(&state, ctx, StatusCode::SERVICE_UNAVAILABLE, ErrorTag::NoCredentialError, "no eligible credential available");
        return api_error_response(ApiError::no_credential(provider));
    };

    let upstream_body = dispatch::map_anthropic_body(&body);
    info!(%trace_id, %provider, model = %body.model, is_stream, event = "request_received");

    let response = match dispatch::send(provider, &ctx.secret.clone().unwrap_or_default(), ctx.egress_proxy.as_deref(), upstream_body).await {
        Ok(response) => response,
        Err(error) => return handle_dispatch_error(&state, ctx, &credential, provider, error).await,
    };

    let status = response.status();
    if !status.is_success() {
        return handle_upstream_error_body(&state, ctx, &credential, provider, status, response).await;
    }
    ctx.http_status_code = Some(status.as_u16() as i32);

    if is_stream {
        stream_response(state, ctx, provider, BridgeMode::Passthrough, response, "text/event-stream")
    } else {
        buffered_anthropic_response(state, ctx, response).await
    }
}

/// Installs the chosen secret/proxy onto the context; returns the
/// pool-sourced credential (if any) for later disable-on-auth-failure.
fn apply_selection(ctx: &mut RequestContext, selection: Selection, request_proxy: Option<String>) -> Option<Option<PooledCredential>> {
    match selection {
        Selection::FromRequest(secret) => {
            ctx.secret = Some(secret);
            ctx.from_pool = false;
            ctx.egress_proxy = request_proxy;
            Some(None)
        }
        Selection::FromPool(credential) => {
            ctx.secret = Some(credential.secret.clone());
            ctx.credential_id = Some(credential.id);
            ctx.from_pool = true;
            ctx.egress_proxy = credential.bound_proxy.clone().or(request_proxy);
            Some(Some(credential))
        }
        Selection::Empty => None,
    }
}

async fn handle_dispatch_error<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    state: &AppState<S>,
    mut ctx: RequestContext,
    credential: &Option<PooledCredential>,
    provider: Provider,
    error: DispatchError,
) -> Response {
    let message = error.to_string();
    let tag = dispatch::classify_error(&message);
    maybe_disable(state, credential, tag, &message).await;
    ctx.first_error = Some(message.clone());
    ctx.error_tag = Some(tag);
    ctx.http_status_code = Some(StatusCode::BAD_GATEWAY.as_u16() as i32);
    warn!(trace_id = %ctx.trace_id, %tag, %message, event = "upstream_dispatch_failed");
    enqueue_log(state, &ctx, None, None);
    api_error_response(ApiError::upstream(provider, tag, message))
}

async fn handle_upstream_error_body<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    state: &AppState<S>,
    mut ctx: RequestContext,
    credential: &Option<PooledCredential>,
    provider: Provider,
    status: http::StatusCode,
    response: wreq::Response,
) -> Response {
    let body_text = response.text().await.unwrap_or_default();
    let tag = dispatch::classify_error(&body_text);
    maybe_disable(state, credential, tag, &body_text).await;
    ctx.first_error = Some(body_text.clone());
    ctx.error_tag = Some(tag);
    ctx.http_status_code = Some(status.as_u16() as i32);
    warn!(trace_id = %ctx.trace_id, %tag, status = status.as_u16(), event = "upstream_error_response");
    enqueue_log(state, &ctx, None, None);
    api_error_response(ApiError::upstream(provider, tag, body_text))
}

async fn maybe_disable<S: gpool_storage::CredentialStore + Send + Sync + 'static>(state: &AppState<S>, credential: &Option<PooledCredential>, tag: ErrorTag, message: &str) {
    if tag != ErrorTag::AuthError {
        return;
    }
    if let Some(credential) = credential
        && let Err(error) = state.pool.disable(credential.id, ErrorCode::Unauthorized, message).await
    {
        warn!(%error, credential_id = credential.id, event = "credential_disable_failed");
    }
}

fn finish_without_dispatch<S: gpool_storage::CredentialStore>(state: &AppState<S>, mut ctx: RequestContext, status: StatusCode, tag: ErrorTag, message: &str) {
    ctx.first_error = Some(message.to_string());
    ctx.error_tag = Some(tag);
    ctx.http_status_code = Some(status.as_u16() as i32);
    enqueue_log(state, &ctx, None, None);
}

fn enqueue_log<S: gpool_storage::CredentialStore>(state: &AppState<S>, ctx: &RequestContext, request_body: Option<Vec<u8>>, response_body: Option<Vec<u8>>) {
    let log_conversation_content = state.config.pool().log_conversation_content;
    let record = build_record(ctx, log_conversation_content, request_body, response_body);
    state.log_writer.enqueue(record);
}

fn api_error_response(err: ApiError) -> Response {
    let mut response = Response::new(Body::from(err.body));
    *response.status_mut() = err.status;
    response.headers_mut().insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
    response
}

/// Spawns the streaming bridge loop and returns an SSE response immediately;
/// the task owns `ctx` and enqueues the log record once the stream ends
/// (spec.md §4.4 cancellation: if the client disconnects, the receiver is
/// dropped, `tx.send` starts failing, and the task exits promptly).
fn stream_response<S: gpool_storage::CredentialStore + Send + Sync + 'static>(
    state: Arc<AppState<S>>,
    mut ctx: RequestContext,
    provider: Provider,
    mode: BridgeMode,
    upstream: wreq::Response,
    content_type: &'static str,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
    tokio::spawn(async move {
        let mut bridge = StreamBridge::new(provider, mode);
        let mut upstream_stream = upstream.bytes_stream();
        loop {
            use futures_util::StreamExt;
            let Some(item) = upstream_stream.next().await else { break };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(error) => {
                    ctx.first_error = Some(error.to_string());
                    ctx.error_tag = Some(ErrorTag::ConnectionError);
                    break;
                }
            };
            for frame in bridge.push(&chunk) {
                if tx.send(Ok(frame)).await.is_err() {
                    // client disconnected; stop reading upstream promptly.
                    ctx.usage = bridge.usage.clone();
                    enqueue_log(&state, &ctx, None, None);
                    return;
                }
            }
        }
        for frame in bridge.finish() {
            if tx.send(Ok(frame)).await.is_err() {
                break;
            }
        }
        ctx.usage = bridge.usage.clone();
        if ctx.error_tag.is_none() {
            ctx.http_status_code = ctx.http_status_code.or(Some(200));
        }
        enqueue_log(&state, &ctx, None, None);
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    let mut response = Response::new(body);
    response.headers_mut().insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static(content_type));
    response
}

async fn buffered_openai_response<S: gpool_storage::CredentialStore + Send + Sync + 'static>(state: Arc<AppState<S>>, mut ctx: RequestContext, provider: Provider, response: wreq::Response) -> Response {
    let raw = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(error) => {
            ctx.first_error = Some(error.to_string());
            ctx.error_tag = Some(ErrorTag::ConnectionError);
            enqueue_log(&state, &ctx, None, None);
            return api_error_response(ApiError::upstream(provider, ErrorTag::ConnectionError, "failed to read upstream response"));
        }
    };
    let Ok(parsed) = serde_json::from_slice::<Value>(&raw) else {
        ctx.first_error = Some("failed to parse upstream response body as JSON".to_string());
        ctx.error_tag = Some(ErrorTag::ParseError);
        enqueue_log(&state, &ctx, None, None);
        return api_error_response(ApiError::upstream(provider, ErrorTag::ParseError, "malformed upstream response"));
    };

    let body = match provider {
        Provider::OpenAi => buffer_openai_response(&parsed),
        Provider::Anthropic => translate_anthropic_message_to_openai(&parsed),
    };
    ctx.usage = extract_buffered_usage(provider, &parsed);
    ctx.http_status_code = Some(StatusCode::OK.as_u16() as i32);
    let log_body = if state.config.pool().log_conversation_content { Some(raw.to_vec()) } else { None };
    enqueue_log(&state, &ctx, None, log_body);
    Json(body).into_response()
}

async fn buffered_anthropic_response<S: gpool_storage::CredentialStore + Send + Sync + 'static>(state: Arc<AppState<S>>, mut ctx: RequestContext, response: wreq::Response) -> Response {
    let raw = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(error) => {
            ctx.first_error = Some(error.to_string());
            ctx.error_tag = Some(ErrorTag::ConnectionError);
            enqueue_log(&state, &ctx, None, None);
            return api_error_response(ApiError::upstream(Provider::Anthropic, ErrorTag::ConnectionError, "failed to read upstream response"));
        }
    };
    let Ok(parsed) = serde_json::from_slice::<Value>(&raw) else {
        ctx.first_error = Some("failed to parse upstream response body as JSON".to_string());
        ctx.error_tag = Some(ErrorTag::ParseError);
        enqueue_log(&state, &ctx, None, None);
        return api_error_response(ApiError::upstream(Provider::Anthropic, ErrorTag::ParseError, "malformed upstream response"));
    };
    ctx.usage = extract_buffered_usage(Provider::Anthropic, &parsed);
    ctx.http_status_code = Some(StatusCode::OK.as_u16() as i32);
    let log_body = if state.config.pool().log_conversation_content { Some(raw.to_vec()) } else { None };
    enqueue_log(&state, &ctx, None, log_body);
    Json(parsed).into_response()
}

/// Assembles a buffered OpenAI `chat.completion` from an Anthropic `message`
/// body (spec.md §4.4 non-stream case, cross-protocol translation).
fn translate_anthropic_message_to_openai(message: &Value) -> Value {
    let text = message.pointer("/content/0/text").and_then(Value::as_str).unwrap_or("");
    let stop_reason = message.get("stop_reason").and_then(Value::as_str);
    let finish_reason = stop_reason.map(|reason| match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "stop_sequence" => "stop",
        _ => "stop",
    });
    let input = message.pointer("/usage/input_tokens").and_then(Value::as_u64).unwrap_or(0);
    let output = message.pointer("/usage/output_tokens").and_then(Value::as_u64).unwrap_or(0);
    json!({
        "id": message.get("id").cloned().unwrap_or(json!(Uuid::new_v4().to_string())),
        "object": "chat.completion",
        "created": time::OffsetDateTime::now_utc().unix_timestamp(),
        "model": message.get("model").cloned().unwrap_or(json!("unknown")),
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": finish_reason,
        }],
        "usage": {
            "prompt_tokens": input,
            "completion_tokens": output,
            "total_tokens": input + output,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpool_common::{Money, PoolConfig, SystemSettings};
    use gpool_protocol::openai::ChatMessage;
    use gpool_storage::{CredentialRow, StorageResult};
    use http::HeaderValue;

    struct EmptyStore;

    #[async_trait]
    impl gpool_storage::CredentialStore for EmptyStore {
        async fn list_eligible(&self, _exclude_ids: &[i64], _limit: u32) -> StorageResult<Vec<CredentialRow>> {
            Ok(Vec::new())
        }
        async fn get(&self, _id: i64) -> StorageResult<Option<CredentialRow>> {
            Ok(None)
        }
        async fn disable(&self, _id: i64, _error_code: gpool_common::ErrorCode, _reason: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn list_enabled_with_total_authorized(&self) -> StorageResult<Vec<CredentialRow>> {
            Ok(Vec::new())
        }
        async fn set_balance(&self, _id: i64, _balance: Money, _at: time::OffsetDateTime) -> StorageResult<()> {
            Ok(())
        }
    }

    struct DiscardingLogStore;

    #[async_trait]
    impl gpool_storage::LogStore for DiscardingLogStore {
        async fn insert(&self, _record: gpool_storage::LogRecord) -> StorageResult<()> {
            Ok(())
        }
        async fn sum_cost(&self, _key_id: i64) -> StorageResult<Money> {
            Ok(Money::ZERO)
        }
        async fn rows_in_window(&self, _start: time::OffsetDateTime, _end: time::OffsetDateTime) -> StorageResult<Vec<gpool_storage::entities::request_log::Model>> {
            Ok(Vec::new())
        }
    }

    fn test_state(api_secret: Option<String>) -> Arc<AppState<EmptyStore>> {
        let mut system = SystemSettings::default();
        system.api_secret = api_secret;
        let snapshot = Arc::new(ConfigSnapshot::new(PoolConfig::default(), system));
        let pool = Arc::new(KeyPool::new(Arc::new(EmptyStore), 5));
        let log_writer = Arc::new(LogWriter::spawn(Arc::new(DiscardingLogStore), 1));
        Arc::new(AppState { config: snapshot, pool, log_writer })
    }

    fn chat_body(model: &str) -> openai::CreateChatCompletionRequestBody {
        openai::CreateChatCompletionRequestBody {
            model: model.to_string(),
            messages: vec![ChatMessage { role: "user".to_string(), content: "hi".to_string() }],
            stream: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            n: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
            api_key: None,
            proxy: None,
        }
    }

    fn message_body(model: &str) -> anthropic::CreateMessageRequestBody {
        anthropic::CreateMessageRequestBody {
            model: model.to_string(),
            messages: vec![anthropic::MessageParam { role: "user".to_string(), content: "hi".to_string() }],
            max_tokens: 16,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            metadata: None,
            api_key: None,
            proxy: None,
        }
    }

    #[test]
    fn wants_anthropic_models_checks_version_header_and_user_agent() {
        let mut headers = HeaderMap::new();
        assert!(!wants_anthropic_models(&headers));

        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        assert!(wants_anthropic_models(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(http::header::USER_AGENT, HeaderValue::from_static("claude-code/1.0"));
        assert!(wants_anthropic_models(&headers));
    }

    #[test]
    fn apply_selection_installs_pool_credential_and_its_proxy() {
        let mut ctx = RequestContext::new("trace".to_string(), Provider::OpenAi, false, "gpt-4o-mini".to_string());
        let credential = PooledCredential { id: 9, secret: "s".to_string(), bound_ua: None, bound_proxy: Some("proxy-a".to_string()) };
        let outcome = apply_selection(&mut ctx, Selection::FromPool(credential), Some("request-proxy".to_string()));
        assert!(matches!(outcome, Some(Some(_))));
        assert_eq!(ctx.secret.as_deref(), Some("s"));
        assert_eq!(ctx.credential_id, Some(9));
        assert!(ctx.from_pool);
        assert_eq!(ctx.egress_proxy.as_deref(), Some("proxy-a"));
    }

    #[test]
    fn apply_selection_on_empty_returns_none() {
        let mut ctx = RequestContext::new("trace".to_string(), Provider::OpenAi, false, "gpt-4o-mini".to_string());
        assert!(apply_selection(&mut ctx, Selection::Empty, None).is_none());
    }

    #[test]
    fn translate_anthropic_message_to_openai_maps_stop_reason_and_usage() {
        let message = json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "max_tokens",
            "content": [{"type": "text", "text": "hello there"}],
            "usage": {"input_tokens": 10, "output_tokens": 3},
        });
        let shaped = translate_anthropic_message_to_openai(&message);
        assert_eq!(shaped["object"], "chat.completion");
        assert_eq!(shaped["choices"][0]["message"]["content"], "hello there");
        assert_eq!(shaped["choices"][0]["finish_reason"], "length");
        assert_eq!(shaped["usage"]["total_tokens"], 13);
    }

    #[tokio::test]
    async fn list_models_returns_openai_shape_by_default() {
        let state = test_state(None);
        let response = list_models(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_models_returns_anthropic_shape_for_anthropic_clients() {
        let state = test_state(None);
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        let response = list_models(State(state), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_completions_rejects_unresolvable_model_before_touching_the_pool() {
        let state = test_state(None);
        let response = chat_completions(State(state), HeaderMap::new(), Json(chat_body("mystery-model"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_completions_rejects_missing_gateway_credential() {
        let state = test_state(Some("configured-secret".to_string()));
        let response = chat_completions(State(state), HeaderMap::new(), Json(chat_body("gpt-4o-mini"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn chat_completions_with_no_eligible_credential_returns_service_unavailable() {
        let state = test_state(None);
        let response = chat_completions(State(state), HeaderMap::new(), Json(chat_body("gpt-4o-mini"))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn messages_rejects_openai_resolved_model() {
        let state = test_state(None);
        let response = messages(State(state), HeaderMap::new(), Json(message_body("gpt-4o-mini"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn messages_with_no_eligible_credential_returns_service_unavailable() {
        let state = test_state(None);
        let response = messages(State(state), HeaderMap::new(), Json(message_body("claude-3-5-sonnet-20241022"))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
