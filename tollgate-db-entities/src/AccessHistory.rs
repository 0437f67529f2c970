use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(
    Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Clone, Copy, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Proxy/VPN tunnel connection
    #[sea_orm(string_value = "connection")]
    Connection,
    /// Subscription link fetch
    #[sea_orm(string_value = "subscription")]
    Subscription,
    #[sea_orm(string_value = "api")]
    Api,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "access_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub ip: String,
    #[sea_orm(column_type = "Text")]
    pub user_agent: String,
    pub access_type: AccessType,
    pub country: Option<String>,
    pub city: Option<String>,
    pub is_suspicious: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
