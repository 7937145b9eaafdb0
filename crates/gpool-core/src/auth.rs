use gpool_common::Provider;
use http::HeaderMap;

use crate::error::ApiError;

/// Pulls a bearer credential out of either `x-api-key` (Anthropic-style) or
/// `Authorization: Bearer <token>` (OpenAI-style), in that order. Grounded
/// on the teacher's `extract_api_key` in `gproxy-core/src/auth.rs`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    let auth = headers.get(http::header::AUTHORIZATION).and_then(|v| v.to_str().ok())?;
    let token = auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer "))?;
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Checks the inbound request's bearer credential against the configured
/// gateway secret (spec.md §6). A blank `api_secret` disables this check
/// entirely, matching the original service's opt-in auth.
pub fn authorize(headers: &HeaderMap, configured_secret: &str, provider: Provider) -> Result<(), ApiError> {
    if configured_secret.is_empty() {
        return Ok(());
    }
    match extract_api_key(headers) {
        Some(presented) if presented == configured_secret => Ok(()),
        _ => Err(ApiError::auth(provider)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn prefers_x_api_key_over_bearer() {
        let mut headers = headers_with("x-api-key", "from-header");
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_str("Bearer from-bearer").unwrap());
        assert_eq!(extract_api_key(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn falls_back_to_bearer_token() {
        let headers = headers_with("authorization", "Bearer secret-token");
        assert_eq!(extract_api_key(&headers).as_deref(), Some("secret-token"));
    }

    #[test]
    fn empty_configured_secret_disables_check() {
        let headers = HeaderMap::new();
        assert!(authorize(&headers, "", Provider::OpenAi).is_ok());
    }

    #[test]
    fn rejects_missing_or_mismatched_credential() {
        let headers = HeaderMap::new();
        assert!(authorize(&headers, "configured-secret", Provider::OpenAi).is_err());

        let headers = headers_with("x-api-key", "wrong");
        assert!(authorize(&headers, "configured-secret", Provider::OpenAi).is_err());

        let headers = headers_with("x-api-key", "configured-secret");
        assert!(authorize(&headers, "configured-secret", Provider::OpenAi).is_ok());
    }
}
