use gpool_common::{PoolConfig, Provider};

use crate::error::ApiError;
use crate::models::{is_model_allowed, resolve_provider};

/// A validated, provider-resolved request, ready for dispatch. Carries
/// just enough of the original body to validate messages without forcing
/// every caller to re-walk the (OpenAI vs. Anthropic) message shape.
pub struct ValidatedMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Runs the full pre-dispatch validation chain from spec.md §4.8. A
/// validation failure must not consume a credential from the pool — the
/// caller is expected to check this before touching the key pool.
#[allow(clippy::too_many_arguments)]
pub fn validate_request(
    config: &PoolConfig,
    model: &str,
    messages: &[ValidatedMessage<'_>],
    temperature: Option<f64>,
    top_p: Option<f64>,
    n: Option<u32>,
    presence_penalty: Option<f64>,
    frequency_penalty: Option<f64>,
    max_tokens: Option<u32>,
) -> Result<Provider, ApiError> {
    if model.is_empty() {
        return Err(ApiError::validation(None, "model must not be empty"));
    }
    let provider = resolve_provider(model).ok_or_else(|| ApiError::validation(None, format!("model '{model}' does not resolve to a known provider")))?;
    if !is_model_allowed(config, provider, model) {
        return Err(ApiError::validation(Some(provider), format!("model '{model}' is not in the allowed list")));
    }
    if messages.is_empty() {
        return Err(ApiError::validation(Some(provider), "messages must be a non-empty list"));
    }
    for message in messages {
        if message.role.is_empty() {
            return Err(ApiError::validation(Some(provider), "message role must not be empty"));
        }
        if message.content.is_empty() {
            return Err(ApiError::validation(Some(provider), "message content must not be empty"));
        }
    }
    if let Some(value) = temperature
        && !(0.0..=2.0).contains(&value)
    {
        return Err(ApiError::validation(Some(provider), "temperature must be within [0,2]"));
    }
    if let Some(value) = top_p
        && !(0.0..=1.0).contains(&value)
    {
        return Err(ApiError::validation(Some(provider), "top_p must be within [0,1]"));
    }
    if let Some(value) = n
        && !(1..=10).contains(&value)
    {
        return Err(ApiError::validation(Some(provider), "n must be within [1,10]"));
    }
    if let Some(value) = presence_penalty
        && !(-2.0..=2.0).contains(&value)
    {
        return Err(ApiError::validation(Some(provider), "presence_penalty must be within [-2,2]"));
    }
    if let Some(value) = frequency_penalty
        && !(-2.0..=2.0).contains(&value)
    {
        return Err(ApiError::validation(Some(provider), "frequency_penalty must be within [-2,2]"));
    }
    if let Some(value) = max_tokens
        && value < 1
    {
        return Err(ApiError::validation(Some(provider), "max_tokens must be >= 1"));
    }
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig::default()
    }

    #[test]
    fn rejects_unknown_model() {
        let err = validate_request(&config(), "mystery-model", &[], None, None, None, None, None, None).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejects_model_not_in_allow_list() {
        let msgs = [ValidatedMessage { role: "user", content: "hi" }];
        let err = validate_request(&config(), "gpt-banana", &msgs, None, None, None, None, None, None).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let msgs = [ValidatedMessage { role: "user", content: "hi" }];
        let err = validate_request(&config(), "gpt-4o-mini", &msgs, Some(3.0), None, None, None, None, None).unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn accepts_valid_request() {
        let msgs = [ValidatedMessage { role: "user", content: "hi" }];
        let provider = validate_request(&config(), "gpt-4o-mini", &msgs, Some(0.5), None, Some(1), None, None, Some(16)).unwrap();
        assert_eq!(provider, gpool_common::Provider::OpenAi);
    }
}
