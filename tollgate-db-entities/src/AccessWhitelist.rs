use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "access_whitelist")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Exact IP address. Exactly one of `ip` and `cidr` is set.
    pub ip: Option<String>,

    /// Network range in CIDR notation
    pub cidr: Option<String>,

    /// Owning account, or None for a global entry
    pub account_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub reason: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
