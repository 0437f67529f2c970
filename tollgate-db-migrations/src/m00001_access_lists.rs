use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub mod access_whitelist {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "access_whitelist")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub ip: Option<String>,
        pub cidr: Option<String>,
        pub account_id: Option<Uuid>,
        #[sea_orm(column_type = "Text")]
        pub reason: String,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod access_blacklist {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "access_blacklist")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub ip: Option<String>,
        pub cidr: Option<String>,
        pub account_id: Option<Uuid>,
        #[sea_orm(column_type = "Text")]
        pub reason: String,
        pub expires_at: Option<DateTime<Utc>>,
        pub is_automatic: bool,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod failed_attempt {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "failed_attempts")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub ip: String,
        pub reason: String,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00001_access_lists"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let builder = manager.get_database_backend();
        let schema = Schema::new(builder);

        manager
            .create_table(schema.create_table_from_entity(access_whitelist::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(access_whitelist::Entity)
                    .name("idx_access_whitelist_account_id")
                    .col(access_whitelist::Column::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(schema.create_table_from_entity(access_blacklist::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(access_blacklist::Entity)
                    .name("idx_access_blacklist_account_id")
                    .col(access_blacklist::Column::AccountId)
                    .to_owned(),
            )
            .await?;

        // Expiry sweep
        manager
            .create_index(
                Index::create()
                    .table(access_blacklist::Entity)
                    .name("idx_access_blacklist_expires_at")
                    .col(access_blacklist::Column::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(schema.create_table_from_entity(failed_attempt::Entity))
            .await?;

        // "failed attempts from IP in time window"
        manager
            .create_index(
                Index::create()
                    .table(failed_attempt::Entity)
                    .name("idx_failed_attempts_ip_created_at")
                    .col(failed_attempt::Column::Ip)
                    .col(failed_attempt::Column::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(failed_attempt::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(access_blacklist::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(access_whitelist::Entity).to_owned())
            .await?;
        Ok(())
    }
}
