use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Append-only per-request log row (spec.md §3, grounded on
/// `original_source/src/entity/databases/request_log.py`).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "request_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: OffsetDateTime,
    /// 0 when the secret was supplied directly by the client.
    pub key_id: i64,
    pub secret_used: String,
    pub proxy_used: Option<String>,
    pub requested_model: String,
    pub response_model: Option<String>,
    pub provider: String,
    // OpenAI-shaped counters.
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    // Anthropic-shaped counters.
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_input_tokens: i64,
    pub cache_read_input_tokens: i64,
    /// Decimal string, 6 fractional digits.
    pub cost: String,
    pub latency_ms: i64,
    pub status: String,
    pub http_status_code: Option<i32>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub request_body: Option<Vec<u8>>,
    pub response_body: Option<Vec<u8>>,
}

impl ActiveModelBehavior for ActiveModel {}
