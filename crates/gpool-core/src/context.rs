use gpool_common::{ErrorTag, Money, Provider};
use time::OffsetDateTime;

/// Usage accumulator threaded through the streaming bridge and read by the
/// log writer at completion (spec.md §3, §4.4).
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_creation_input_tokens: u32,
    pub cache_read_input_tokens: u32,
    pub credits: Money,
    pub text: String,
    pub model: Option<String>,
}

/// The request-scoped value threading request, chosen credential, egress
/// proxy, outcome, and timing through the pipeline (spec.md §3). Created on
/// request entry, destroyed after the log record is enqueued; the log
/// writer takes a copy of what it needs (`LogRecord`) rather than the
/// context itself.
pub struct RequestContext {
    pub trace_id: String,
    pub provider: Provider,
    pub is_stream: bool,
    pub requested_model: String,
    pub secret: Option<String>,
    pub credential_id: Option<i64>,
    pub from_pool: bool,
    pub egress_proxy: Option<String>,
    pub started_at: OffsetDateTime,
    pub first_error: Option<String>,
    pub error_tag: Option<ErrorTag>,
    pub http_status_code: Option<i32>,
    pub usage: UsageAccumulator,
}

impl RequestContext {
    pub fn new(trace_id: String, provider: Provider, is_stream: bool, requested_model: String) -> Self {
        Self {
            trace_id,
            provider,
            is_stream,
            requested_model,
            secret: None,
            credential_id: None,
            from_pool: false,
            egress_proxy: None,
            started_at: OffsetDateTime::now_utc(),
            first_error: None,
            error_tag: None,
            http_status_code: None,
            usage: UsageAccumulator::default(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        let elapsed = OffsetDateTime::now_utc() - self.started_at;
        elapsed.whole_milliseconds().max(0) as i64
    }
}
