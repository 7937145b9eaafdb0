use std::sync::Arc;

use gpool_common::RequestStatus;
use gpool_storage::{LogRecord, LogStore};
use tokio::sync::{mpsc, Mutex};

use crate::context::RequestContext;

pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Bounded worker pool fronting the log store (spec.md §4.5). `enqueue`
/// never blocks the request path: the channel is unbounded so a send only
/// fails once every worker and the receiver itself have been dropped, which
/// only happens at shutdown.
pub struct LogWriter {
    sender: mpsc::UnboundedSender<LogRecord>,
}

impl LogWriter {
    /// Spawns `worker_count` tasks sharing one FIFO queue, each opening the
    /// store handle it's given and writing rows as they arrive. Grounded on
    /// the teacher's worker-pool-over-a-shared-receiver shape used for its
    /// background ingestion tasks.
    pub fn spawn<S: LogStore + 'static>(store: Arc<S>, worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);
        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    let record = receiver.lock().await.recv().await;
                    match record {
                        Some(record) => {
                            if let Err(error) = store.insert(record).await {
                                tracing::error!(worker_id, %error, event = "log_write_failed");
                            }
                        }
                        None => break,
                    }
                }
            });
        }
        Self { sender }
    }

    /// Enqueues a record, never blocking and never surfacing a failure to
    /// the caller. A send error only occurs once every worker has
    /// terminated, at which point there is nothing left to log to anyway.
    pub fn enqueue(&self, record: LogRecord) {
        if self.sender.send(record).is_err() {
            tracing::error!(event = "log_enqueue_failed", "log writer channel is closed");
        }
    }
}

/// Builds the persisted row from a finished request's context (spec.md
/// §4.5). `request_body`/`response_body` are included only when the
/// content-logging flag was true at the time the context was built.
pub fn build_record(ctx: &RequestContext, log_conversation_content: bool, request_body: Option<Vec<u8>>, response_body: Option<Vec<u8>>) -> LogRecord {
    let status = match (&ctx.first_error, ctx.http_status_code) {
        (Some(_), _) => RequestStatus::Error,
        (None, Some(code)) if (200..300).contains(&code) => RequestStatus::Success,
        (None, Some(_)) => RequestStatus::Error,
        (None, None) => RequestStatus::Unknown,
    };
    let input = ctx.usage.input_tokens as i64;
    let output = ctx.usage.output_tokens as i64;

    LogRecord {
        created_at: ctx.started_at,
        key_id: if ctx.from_pool { ctx.credential_id.unwrap_or(0) } else { 0 },
        secret_used: ctx.secret.clone().unwrap_or_default(),
        proxy_used: ctx.egress_proxy.clone(),
        requested_model: ctx.requested_model.clone(),
        response_model: ctx.usage.model.clone(),
        provider: ctx.provider.as_str().to_string(),
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
        input_tokens: input,
        output_tokens: output,
        cache_creation_input_tokens: ctx.usage.cache_creation_input_tokens as i64,
        cache_read_input_tokens: ctx.usage.cache_read_input_tokens as i64,
        cost: ctx.usage.credits,
        latency_ms: ctx.elapsed_ms(),
        status: status.as_str().to_string(),
        http_status_code: ctx.http_status_code,
        error_type: ctx.error_tag.map(|tag| tag.as_str().to_string()),
        error_message: ctx.first_error.clone(),
        request_body: if log_conversation_content { request_body } else { None },
        response_body: if log_conversation_content { response_body } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpool_common::{Money, Provider};
    use gpool_storage::StorageResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingStore {
        inserted: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl LogStore for CountingStore {
        async fn insert(&self, _record: LogRecord) -> StorageResult<()> {
            self.inserted.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            Ok(())
        }

        async fn sum_cost(&self, _key_id: i64) -> StorageResult<Money> {
            Ok(Money::ZERO)
        }

        async fn rows_in_window(
            &self,
            _start: time::OffsetDateTime,
            _end: time::OffsetDateTime,
        ) -> StorageResult<Vec<gpool_storage::entities::request_log::Model>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn enqueue_delivers_to_a_worker() {
        let store = Arc::new(CountingStore { inserted: AtomicUsize::new(0), notify: Notify::new() });
        let writer = LogWriter::spawn(store.clone(), 2);
        let mut ctx = RequestContext::new("trace-1".to_string(), Provider::OpenAi, false, "gpt-4o-mini".to_string());
        ctx.http_status_code = Some(200);
        let record = build_record(&ctx, false, None, None);
        writer.enqueue(record);
        store.notify.notified().await;
        assert_eq!(store.inserted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn build_record_marks_success_on_2xx_without_error() {
        let mut ctx = RequestContext::new("t".to_string(), Provider::OpenAi, false, "gpt-4o-mini".to_string());
        ctx.http_status_code = Some(200);
        let record = build_record(&ctx, false, None, None);
        assert_eq!(record.status, "success");
        assert_eq!(record.key_id, 0);
    }

    #[test]
    fn build_record_respects_content_logging_flag() {
        let mut ctx = RequestContext::new("t".to_string(), Provider::OpenAi, false, "gpt-4o-mini".to_string());
        ctx.http_status_code = Some(200);
        let record = build_record(&ctx, true, Some(b"req".to_vec()), Some(b"resp".to_vec()));
        assert_eq!(record.request_body.as_deref(), Some(b"req".as_slice()));
        let record = build_record(&ctx, false, Some(b"req".to_vec()), Some(b"resp".to_vec()));
        assert!(record.request_body.is_none());
    }
}
