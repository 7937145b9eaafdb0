use async_trait::async_trait;
use gpool_common::{ErrorCode, Money};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::entities::{credentials, request_log, rollups, system_config};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("credential not found: {0}")]
    CredentialNotFound(i64),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Row shape handed to the in-memory key pool; a thin projection of
/// `credentials::Model` (spec.md §3).
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: i64,
    pub secret: String,
    pub bound_ua: Option<String>,
    pub bound_proxy: Option<String>,
    pub balance: Option<Money>,
    pub total_authorized: Option<Money>,
}

impl From<credentials::Model> for CredentialRow {
    fn from(m: credentials::Model) -> Self {
        Self {
            id: m.id,
            secret: m.secret,
            bound_ua: m.bound_ua,
            bound_proxy: m.bound_proxy,
            balance: m.balance.as_deref().map(Money::parse_or_zero),
            total_authorized: m.total_authorized.as_deref().map(Money::parse_or_zero),
        }
    }
}

/// CRUD + filtered queries over credentials (spec.md §6 `credential_store`).
/// The mutating half of the interface (insert/update/delete) backs the
/// out-of-scope admin CRUD surface; the core only drives `list_eligible`,
/// `disable`, and the balance-refresh path.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_eligible(&self, exclude_ids: &[i64], limit: u32) -> StorageResult<Vec<CredentialRow>>;
    async fn get(&self, id: i64) -> StorageResult<Option<CredentialRow>>;
    /// Atomically (from the caller's perspective) marks a credential
    /// disabled with the observed error code. Spec.md §3 ownership note:
    /// the persistent row and the cache must both reflect this.
    async fn disable(&self, id: i64, error_code: ErrorCode, reason: &str) -> StorageResult<()>;
    async fn list_enabled_with_total_authorized(&self) -> StorageResult<Vec<CredentialRow>>;
    async fn set_balance(&self, id: i64, balance: Money, at: OffsetDateTime) -> StorageResult<()>;
}

pub struct SeaOrmCredentialStore {
    db: DatabaseConnection,
}

impl SeaOrmCredentialStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for SeaOrmCredentialStore {
    async fn list_eligible(&self, exclude_ids: &[i64], limit: u32) -> StorageResult<Vec<CredentialRow>> {
        // `balance` is a decimal-string column (never a binary float, per
        // spec.md §9); a DB-level `.gt("0")` would compare it lexicographically
        // (e.g. "0.00" > "0" as text) and never exclude a depleted credential.
        // Filter numerically in Rust instead, after parsing each row's balance.
        let mut query = credentials::Entity::find().filter(credentials::Column::Enabled.eq(true));
        if !exclude_ids.is_empty() {
            query = query.filter(credentials::Column::Id.is_not_in(exclude_ids.to_vec()));
        }
        let rows = query.all(&self.db).await?;
        let eligible = rows
            .into_iter()
            .map(CredentialRow::from)
            .filter(|row| row.balance.map_or(true, |b| b > Money::ZERO))
            .take(limit as usize)
            .collect();
        Ok(eligible)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<CredentialRow>> {
        let row = credentials::Entity::find_by_id(id).one(&self.db).await?;
        Ok(row.map(CredentialRow::from))
    }

    async fn disable(&self, id: i64, error_code: ErrorCode, reason: &str) -> StorageResult<()> {
        let existing = credentials::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::CredentialNotFound(id))?;
        let mut active: credentials::ActiveModel = existing.into();
        active.enabled = Set(false);
        active.last_error_code = Set(Some(error_code.as_str().to_string()));
        active.memo = Set(Some(reason.to_string()));
        active.updated_at = Set(now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn list_enabled_with_total_authorized(&self) -> StorageResult<Vec<CredentialRow>> {
        let rows = credentials::Entity::find()
            .filter(credentials::Column::Enabled.eq(true))
            .filter(credentials::Column::TotalAuthorized.is_not_null())
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(CredentialRow::from).collect())
    }

    async fn set_balance(&self, id: i64, balance: Money, at: OffsetDateTime) -> StorageResult<()> {
        let existing = credentials::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::CredentialNotFound(id))?;
        let mut active: credentials::ActiveModel = existing.into();
        active.balance = Set(Some(balance.to_string()));
        active.balance_last_update = Set(Some(at));
        active.updated_at = Set(at);
        active.update(&self.db).await?;
        Ok(())
    }
}

/// A fully-built log row, constructed by the request-log writer from the
/// request context snapshot (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub created_at: OffsetDateTime,
    pub key_id: i64,
    pub secret_used: String,
    pub proxy_used: Option<String>,
    pub requested_model: String,
    pub response_model: Option<String>,
    pub provider: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_input_tokens: i64,
    pub cache_read_input_tokens: i64,
    pub cost: Money,
    pub latency_ms: i64,
    pub status: String,
    pub http_status_code: Option<i32>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub request_body: Option<Vec<u8>>,
    pub response_body: Option<Vec<u8>>,
}

/// Append-only log persistence plus the cost-summation query the rollup
/// worker uses for balance refresh (spec.md §6 `log_store`).
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn insert(&self, record: LogRecord) -> StorageResult<()>;
    /// Sums `cost` across successful rows for one credential id, used by
    /// the per-key balance refresh (spec.md §4.6 step 4).
    async fn sum_cost(&self, key_id: i64) -> StorageResult<Money>;
    /// All rows within `[start, end)`, used by the rollup scan (spec.md
    /// §4.6 step 1).
    async fn rows_in_window(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> StorageResult<Vec<request_log::Model>>;
}

pub struct SeaOrmLogStore {
    db: DatabaseConnection,
}

impl SeaOrmLogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LogStore for SeaOrmLogStore {
    async fn insert(&self, record: LogRecord) -> StorageResult<()> {
        let active = request_log::ActiveModel {
            id: ActiveValue::NotSet,
            created_at: Set(record.created_at),
            key_id: Set(record.key_id),
            secret_used: Set(record.secret_used),
            proxy_used: Set(record.proxy_used),
            requested_model: Set(record.requested_model),
            response_model: Set(record.response_model),
            provider: Set(record.provider),
            prompt_tokens: Set(record.prompt_tokens),
            completion_tokens: Set(record.completion_tokens),
            total_tokens: Set(record.total_tokens),
            input_tokens: Set(record.input_tokens),
            output_tokens: Set(record.output_tokens),
            cache_creation_input_tokens: Set(record.cache_creation_input_tokens),
            cache_read_input_tokens: Set(record.cache_read_input_tokens),
            cost: Set(record.cost.to_string()),
            latency_ms: Set(record.latency_ms),
            status: Set(record.status),
            http_status_code: Set(record.http_status_code),
            error_type: Set(record.error_type),
            error_message: Set(record.error_message),
            request_body: Set(record.request_body),
            response_body: Set(record.response_body),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn sum_cost(&self, key_id: i64) -> StorageResult<Money> {
        let rows = request_log::Entity::find()
            .filter(request_log::Column::KeyId.eq(key_id))
            .filter(request_log::Column::Status.eq("success"))
            .all(&self.db)
            .await?;
        Ok(rows.iter().map(|row| Money::parse_or_zero(&row.cost)).sum())
    }

    async fn rows_in_window(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> StorageResult<Vec<request_log::Model>> {
        let rows = request_log::Entity::find()
            .filter(request_log::Column::CreatedAt.gte(start))
            .filter(request_log::Column::CreatedAt.lt(end))
            .order_by_asc(request_log::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(rows)
    }
}

/// One materialized rollup row, keyed as described in spec.md §3.
#[derive(Debug, Clone)]
pub struct RollupKey {
    pub stat_date: time::Date,
    pub stat_hour: Option<i16>,
    pub stat_type: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub key_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct RollupAggregate {
    pub request_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens_openai: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_input_tokens: i64,
    pub cache_read_input_tokens: i64,
    pub total_cost: Money,
    pub avg_latency_ms: i64,
    pub max_latency_ms: i64,
    pub min_latency_ms: i64,
}

/// Upsert + query over materialized rollup rows (spec.md §6 `rollup_store`).
#[async_trait]
pub trait RollupStore: Send + Sync {
    async fn upsert(&self, key: RollupKey, aggregate: RollupAggregate) -> StorageResult<()>;
}

pub struct SeaOrmRollupStore {
    db: DatabaseConnection,
}

impl SeaOrmRollupStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RollupStore for SeaOrmRollupStore {
    async fn upsert(&self, key: RollupKey, aggregate: RollupAggregate) -> StorageResult<()> {
        let mut query = rollups::Entity::find()
            .filter(rollups::Column::StatDate.eq(key.stat_date))
            .filter(rollups::Column::StatType.eq(key.stat_type.clone()));
        query = match key.stat_hour {
            Some(hour) => query.filter(rollups::Column::StatHour.eq(hour)),
            None => query.filter(rollups::Column::StatHour.is_null()),
        };
        query = match &key.provider {
            Some(provider) => query.filter(rollups::Column::Provider.eq(provider.clone())),
            None => query.filter(rollups::Column::Provider.is_null()),
        };
        query = match &key.model {
            Some(model) => query.filter(rollups::Column::Model.eq(model.clone())),
            None => query.filter(rollups::Column::Model.is_null()),
        };
        query = match key.key_id {
            Some(id) => query.filter(rollups::Column::KeyId.eq(id)),
            None => query.filter(rollups::Column::KeyId.is_null()),
        };

        let existing = query.one(&self.db).await?;
        let mut active = match existing {
            Some(model) => {
                let active: rollups::ActiveModel = model.into();
                active
            }
            None => rollups::ActiveModel {
                id: ActiveValue::NotSet,
                stat_date: Set(key.stat_date),
                stat_hour: Set(key.stat_hour),
                stat_type: Set(key.stat_type),
                provider: Set(key.provider),
                model: Set(key.model),
                key_id: Set(key.key_id),
                ..Default::default()
            },
        };
        active.request_count = Set(aggregate.request_count);
        active.success_count = Set(aggregate.success_count);
        active.error_count = Set(aggregate.error_count);
        active.prompt_tokens = Set(aggregate.prompt_tokens);
        active.completion_tokens = Set(aggregate.completion_tokens);
        active.total_tokens_openai = Set(aggregate.total_tokens_openai);
        active.input_tokens = Set(aggregate.input_tokens);
        active.output_tokens = Set(aggregate.output_tokens);
        active.cache_creation_input_tokens = Set(aggregate.cache_creation_input_tokens);
        active.cache_read_input_tokens = Set(aggregate.cache_read_input_tokens);
        active.total_cost = Set(aggregate.total_cost.to_string());
        active.avg_latency_ms = Set(aggregate.avg_latency_ms);
        active.max_latency_ms = Set(aggregate.max_latency_ms);
        active.min_latency_ms = Set(aggregate.min_latency_ms);

        if active.id.is_not_set() {
            active.insert(&self.db).await?;
        } else {
            active.update(&self.db).await?;
        }
        Ok(())
    }
}

/// Single JSON-blob row holding the persisted config overlay (spec.md §4.1,
/// `config_store`).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_all(&self) -> StorageResult<Option<JsonValue>>;
    async fn put_many(&self, value: JsonValue) -> StorageResult<()>;
}

pub struct SeaOrmConfigStore {
    db: DatabaseConnection,
}

impl SeaOrmConfigStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

const SYSTEM_CONFIG_ROW_ID: i64 = 1;

#[async_trait]
impl ConfigStore for SeaOrmConfigStore {
    async fn get_all(&self) -> StorageResult<Option<JsonValue>> {
        let row = system_config::Entity::find_by_id(SYSTEM_CONFIG_ROW_ID).one(&self.db).await?;
        Ok(row.map(|row| row.config_json))
    }

    async fn put_many(&self, value: JsonValue) -> StorageResult<()> {
        let existing = system_config::Entity::find_by_id(SYSTEM_CONFIG_ROW_ID).one(&self.db).await?;
        let now = now();
        let active = match existing {
            Some(model) => {
                let mut active: system_config::ActiveModel = model.into();
                active.config_json = Set(value);
                active.updated_at = Set(now);
                active
            }
            None => system_config::ActiveModel {
                id: Set(SYSTEM_CONFIG_ROW_ID),
                config_json: Set(value),
                updated_at: Set(now),
            },
        };
        active.save(&self.db).await?;
        Ok(())
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
