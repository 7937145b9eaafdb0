use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gpool_core::handler::{chat_completions, healthz, list_models, messages, AppState};
use gpool_storage::CredentialStore;

/// Assembles the full HTTP surface (spec.md §6), nested under the
/// operator-configured `api_prefix`. Built once at startup: unlike
/// `PoolConfig`, the prefix is only ever read at process start, so there is
/// no need for the router itself to live behind the `ArcSwap`.
pub fn build_router<S: CredentialStore + Send + Sync + 'static>(state: Arc<AppState<S>>, api_prefix: &str) -> Router {
    let api = Router::new()
        .route("/v1/chat/completions", post(chat_completions::<S>))
        .route("/v1/messages", post(messages::<S>))
        .route("/v1/models", get(list_models::<S>))
        .with_state(state);

    let healthz_route = Router::new().route("/healthz", get(healthz));

    if api_prefix.is_empty() {
        api.merge(healthz_route)
    } else {
        Router::new().nest(api_prefix, api).merge(healthz_route)
    }
}
