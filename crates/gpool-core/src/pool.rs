use std::collections::HashMap;
use std::sync::Arc;

use gpool_common::{ErrorCode, Money};
use gpool_storage::{CredentialRow, CredentialStore, StorageError};
use rand::seq::IteratorRandom;
use tokio::sync::Mutex;

/// An eligible, cached credential (spec.md §3, §4.2). Kept distinct from
/// `gpool_storage::CredentialRow` so the pool's shape is independent of the
/// storage layer's.
#[derive(Debug, Clone)]
pub struct PooledCredential {
    pub id: i64,
    pub secret: String,
    pub bound_ua: Option<String>,
    pub bound_proxy: Option<String>,
}

impl From<CredentialRow> for PooledCredential {
    fn from(row: CredentialRow) -> Self {
        Self { id: row.id, secret: row.secret, bound_ua: row.bound_ua, bound_proxy: row.bound_proxy }
    }
}

/// Outcome of credential selection (spec.md §4.2): either a pool-sourced
/// credential, a client-supplied one passed through unchanged, or nothing
/// eligible. `KeyPool::select` only ever produces `FromPool`/`Empty`;
/// `FromRequest` is filled in by the caller when the request body already
/// carries a secret, so both paths share one result type.
pub enum Selection {
    FromPool(PooledCredential),
    FromRequest(String),
    Empty,
}

/// Bounded in-memory cache of eligible credentials, fronting the
/// persistent store. Mutations (`add`/`evict`/`select`) are serialized
/// behind a single mutex (spec.md §5: "all three must be serialized
/// against one another"), grounded on the simpler, non-weighted
/// `CredentialPool` in the teacher's `credential/pool.rs` — not the
/// multi-credential retry executor, which this spec does not call for.
pub struct KeyPool<S: CredentialStore> {
    store: Arc<S>,
    target_size: u32,
    cache: Mutex<HashMap<i64, PooledCredential>>,
}

impl<S: CredentialStore> KeyPool<S> {
    pub fn new(store: Arc<S>, target_size: u32) -> Self {
        Self { store, target_size, cache: Mutex::new(HashMap::new()) }
    }

    /// Entry point used by request handlers: returns the client-supplied
    /// secret unchanged when present, otherwise delegates to `select`
    /// (spec.md §4.2: "if ctx already carries a client-supplied secret,
    /// return it unchanged").
    pub async fn select_for(&self, client_secret: Option<String>) -> Result<Selection, StorageError> {
        if let Some(secret) = client_secret {
            return Ok(Selection::FromRequest(secret));
        }
        self.select().await
    }

    /// Selects a credential for a request that did not supply its own
    /// secret. Backfills the cache from the store when short, then picks
    /// uniformly at random (spec.md §4.2).
    pub async fn select(&self) -> Result<Selection, StorageError> {
        let mut cache = self.cache.lock().await;
        let shortfall = self.target_size.saturating_sub(cache.len() as u32);
        if shortfall > 0 {
            let exclude: Vec<i64> = cache.keys().copied().collect();
            let fetched = self.store.list_eligible(&exclude, shortfall).await?;
            for row in fetched {
                cache.entry(row.id).or_insert_with(|| PooledCredential::from(row));
            }
        }

        if cache.is_empty() {
            return Ok(Selection::Empty);
        }

        let mut rng = rand::rng();
        let chosen_id = *cache.keys().choose(&mut rng).expect("cache checked non-empty above");
        let chosen = cache.get(&chosen_id).cloned().expect("id just drawn from this map");
        Ok(Selection::FromPool(chosen))
    }

    /// Removes the cache entry with that id; idempotent.
    pub async fn evict(&self, id: i64) {
        self.cache.lock().await.remove(&id);
    }

    /// Inserts into the cache iff no entry with that id exists.
    pub async fn add(&self, credential: PooledCredential) {
        self.cache.lock().await.entry(credential.id).or_insert(credential);
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Marks the credential disabled in the store and evicts it from the
    /// cache. The persistent update happens first so a concurrent refill
    /// never re-admits the same id from the store before it is evicted
    /// here (spec.md §3: "must update the persistent row and evict from
    /// the cache atomically from the caller's perspective").
    pub async fn disable(&self, id: i64, error_code: ErrorCode, reason: &str) -> Result<(), StorageError> {
        self.store.disable(id, error_code, reason).await?;
        self.evict(id).await;
        Ok(())
    }
}

/// A money amount coerced through decimal parsing, used only by tests in
/// this module to avoid pulling in `gpool-storage`'s full `CredentialRow`
/// construction machinery.
#[cfg(test)]
fn test_row(id: i64, secret: &str) -> CredentialRow {
    CredentialRow { id, secret: secret.to_string(), bound_ua: None, bound_proxy: None, balance: None, total_authorized: Some(Money::ZERO) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpool_storage::StorageResult;
    use std::sync::atomic::{AtomicI64, Ordering};
    use time::OffsetDateTime;
    use tokio::sync::Mutex as TokioMutex;

    struct FakeStore {
        rows: TokioMutex<Vec<CredentialRow>>,
        disabled: AtomicI64,
    }

    #[async_trait]
    impl CredentialStore for FakeStore {
        async fn list_eligible(&self, exclude_ids: &[i64], limit: u32) -> StorageResult<Vec<CredentialRow>> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|row| !exclude_ids.contains(&row.id))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn get(&self, id: i64) -> StorageResult<Option<CredentialRow>> {
            Ok(self.rows.lock().await.iter().find(|row| row.id == id).cloned())
        }

        async fn disable(&self, id: i64, _error_code: gpool_common::ErrorCode, _reason: &str) -> StorageResult<()> {
            self.disabled.store(id, Ordering::SeqCst);
            self.rows.lock().await.retain(|row| row.id != id);
            Ok(())
        }

        async fn list_enabled_with_total_authorized(&self) -> StorageResult<Vec<CredentialRow>> {
            Ok(self.rows.lock().await.clone())
        }

        async fn set_balance(&self, _id: i64, _balance: Money, _at: OffsetDateTime) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn select_backfills_and_picks_one() {
        let store = Arc::new(FakeStore {
            rows: TokioMutex::new(vec![test_row(1, "s1"), test_row(2, "s2")]),
            disabled: AtomicI64::new(0),
        });
        let pool = KeyPool::new(store, 5);
        match pool.select().await.unwrap() {
            Selection::FromPool(cred) => assert!(cred.id == 1 || cred.id == 2),
            _ => panic!("expected a pool selection"),
        }
        assert_eq!(pool.cache_len().await, 2);
    }

    #[tokio::test]
    async fn select_returns_empty_when_store_has_nothing() {
        let store = Arc::new(FakeStore { rows: TokioMutex::new(vec![]), disabled: AtomicI64::new(0) });
        let pool = KeyPool::new(store, 5);
        assert!(matches!(pool.select().await.unwrap(), Selection::Empty));
    }

    #[tokio::test]
    async fn disable_evicts_and_never_reappears() {
        let store = Arc::new(FakeStore {
            rows: TokioMutex::new(vec![test_row(1, "s1")]),
            disabled: AtomicI64::new(0),
        });
        let pool = KeyPool::new(store.clone(), 5);
        pool.select().await.unwrap();
        assert_eq!(pool.cache_len().await, 1);

        pool.disable(1, ErrorCode::Unauthorized, "auth failure").await.unwrap();
        assert_eq!(pool.cache_len().await, 0);
        assert_eq!(store.disabled.load(Ordering::SeqCst), 1);

        // N >= cache size calls after eviction must never return the id again.
        for _ in 0..5 {
            assert!(matches!(pool.select().await.unwrap(), Selection::Empty));
        }
    }

    #[tokio::test]
    async fn add_dedups_by_id() {
        let store = Arc::new(FakeStore { rows: TokioMutex::new(vec![]), disabled: AtomicI64::new(0) });
        let pool = KeyPool::new(store, 5);
        pool.add(PooledCredential { id: 7, secret: "a".into(), bound_ua: None, bound_proxy: None }).await;
        pool.add(PooledCredential { id: 7, secret: "b".into(), bound_ua: None, bound_proxy: None }).await;
        assert_eq!(pool.cache_len().await, 1);
    }
}
