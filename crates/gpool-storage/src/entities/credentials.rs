use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// A pooled upstream credential. Invariants (spec.md §3): `secret` is
/// unique; disabled credentials never appear in the in-memory pool;
/// `balance <= total_authorized` once both are set.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub label: String,
    #[sea_orm(unique)]
    pub secret: String,
    pub bound_ua: Option<String>,
    pub bound_proxy: Option<String>,
    pub enabled: bool,
    /// Decimal string, 2 fractional digits — never a binary float.
    pub balance: Option<String>,
    pub total_authorized: Option<String>,
    pub balance_last_update: Option<OffsetDateTime>,
    pub last_error_code: Option<String>,
    pub memo: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
