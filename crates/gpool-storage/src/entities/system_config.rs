use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Single-row JSON blob holding the persisted `PoolConfig`/`SystemSettings`
/// overlay (spec.md §4.1/§6). Takes precedence over environment defaults.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "system_config")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub config_json: Json,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
