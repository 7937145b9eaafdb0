use bytes::Bytes;
use gpool_common::{ErrorTag, Provider};
use http::StatusCode;
use serde_json::json;

/// A client-visible error, already shaped into the protocol-correct
/// envelope for its provider (spec.md §4.7).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub tag: ErrorTag,
    pub body: Bytes,
}

impl ApiError {
    pub fn validation(provider: Option<Provider>, message: impl Into<String>) -> Self {
        Self::shaped(StatusCode::BAD_REQUEST, ErrorTag::ValidationError, provider, "invalid_request_error", message)
    }

    pub fn no_credential(provider: Provider) -> Self {
        Self::shaped(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorTag::NoCredentialError,
            Some(provider),
            "no_credential_available",
            "no eligible credential available in the pool",
        )
    }

    /// The gateway's own bearer-credential check (spec.md §4.7/§7: "auth/
    /// permission → 401"), distinct from `upstream` — no upstream call was
    /// ever made.
    pub fn auth(provider: Provider) -> Self {
        Self::shaped(
            StatusCode::UNAUTHORIZED,
            ErrorTag::AuthError,
            Some(provider),
            "authentication_error",
            "missing or invalid gateway credential",
        )
    }

    pub fn upstream(provider: Provider, tag: ErrorTag, message: impl Into<String>) -> Self {
        Self::shaped(StatusCode::BAD_GATEWAY, tag, Some(provider), tag.as_str(), message)
    }

    fn shaped(
        status: StatusCode,
        tag: ErrorTag,
        provider: Option<Provider>,
        error_type: &str,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let body = match provider {
            Some(Provider::Anthropic) => json!({
                "type": "error",
                "error": { "type": error_type, "message": message },
            }),
            _ => json!({
                "error": { "message": message, "type": error_type },
            }),
        };
        Self { status, tag, body: Bytes::from(body.to_string()) }
    }
}
