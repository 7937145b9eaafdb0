mod config;
mod money;

pub use config::{normalize_prefix, PoolConfig, PoolConfigPatch, SystemSettings};
pub use money::Money;

use serde::{Deserialize, Serialize};

/// Upstream provider, resolved from the requested model name via a static
/// table owned by `gpool-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            _ => Err(()),
        }
    }
}

/// Last-observed error code on a credential. Mirrors the enum spelled out in
/// the `api_key.error_code` column of the original service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    RateLimit,
    InsufficientQuota,
    Timeout,
    CheckFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::InsufficientQuota => "INSUFFICIENT_QUOTA",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::CheckFailed => "CHECK_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed request, as recorded on the log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Error,
    Unknown,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
            RequestStatus::Unknown => "unknown",
        }
    }
}

/// Classified error tag, stable across releases (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorTag {
    ValidationError,
    AuthError,
    RateLimitError,
    QuotaError,
    TimeoutError,
    ConnectionError,
    NotFoundError,
    ServerError,
    ParseError,
    NoCredentialError,
    OtherError,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::ValidationError => "ValidationError",
            ErrorTag::AuthError => "AuthError",
            ErrorTag::RateLimitError => "RateLimitError",
            ErrorTag::QuotaError => "QuotaError",
            ErrorTag::TimeoutError => "TimeoutError",
            ErrorTag::ConnectionError => "ConnectionError",
            ErrorTag::NotFoundError => "NotFoundError",
            ErrorTag::ServerError => "ServerError",
            ErrorTag::ParseError => "ParseError",
            ErrorTag::NoCredentialError => "NoCredentialError",
            ErrorTag::OtherError => "OtherError",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection strategy for the key pool. Only `Random` is implemented; the
/// numeric values `1`/`2` are accepted and coerced (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionStrategy {
    #[default]
    Random,
}

impl SelectionStrategy {
    pub fn from_raw(raw: i64) -> Self {
        if raw != 0 {
            tracing::warn!(raw, "unsupported key_selection_strategy, coercing to RANDOM");
        }
        SelectionStrategy::Random
    }
}
