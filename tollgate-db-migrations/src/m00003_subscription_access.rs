use sea_orm::Schema;
use sea_orm_migration::prelude::*;

pub mod subscription_access {
    use chrono::{DateTime, Utc};
    use sea_orm::entity::prelude::*;
    use uuid::Uuid;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "subscription_accesses")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub subscription_token: String,
        pub ip: String,
        #[sea_orm(column_type = "Text")]
        pub user_agent: String,
        pub country: Option<String>,
        pub access_count: i64,
        pub first_access: DateTime<Utc>,
        pub last_access: DateTime<Utc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m00003_subscription_access"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let builder = manager.get_database_backend();
        let schema = Schema::new(builder);

        manager
            .create_table(schema.create_table_from_entity(subscription_access::Entity))
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(subscription_access::Entity)
                    .name("idx_subscription_accesses_token_ip")
                    .col(subscription_access::Column::SubscriptionToken)
                    .col(subscription_access::Column::Ip)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(subscription_access::Entity).to_owned())
            .await?;
        Ok(())
    }
}
