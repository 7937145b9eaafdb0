use sea_orm::entity::prelude::*;
use time::Date;

/// Materialized aggregate row (spec.md §3, grounded on
/// `original_source/src/entity/databases/request_stats.py`). Identified by
/// `(stat_date, stat_hour, stat_type, provider, model, key_id)`; null
/// dimension fields widen the aggregation. `stat_hour = NULL` means
/// whole-day.
///
/// original_source additionally indexes this table on
/// `(stat_date, stat_hour)`, `(stat_type, stat_date)`, `(provider, stat_date)`
/// and `(model, stat_date)`; those indexes belong to the schema-migration
/// bootstrap, which is out of scope here (spec.md §1).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rollups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub stat_date: Date,
    pub stat_hour: Option<i16>,
    pub stat_type: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub key_id: Option<i64>,
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
    /// Decimal string, 6 fractional digits.
    pub total_cost: String,
    pub avg_latency_ms: i64,
    pub max_latency_ms: i64,
    pub min_latency_ms: i64,
}

impl ActiveModelBehavior for ActiveModel {}
