use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Hash, Serialize, Clone, Copy, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[sea_orm(string_value = "mobile")]
    Mobile,
    #[sea_orm(string_value = "tablet")]
    Tablet,
    #[sea_orm(string_value = "desktop")]
    Desktop,
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

/// One device currently counted against an account's concurrency limit.
/// At most one row exists per (account_id, ip).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "active_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub ip: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    pub device_type: DeviceType,
    pub country: Option<String>,
    pub city: Option<String>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
