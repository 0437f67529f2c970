use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;
use sea_orm_migration::MigrationTrait;

mod m00001_access_lists;
mod m00002_sessions_and_history;
mod m00003_subscription_access;
mod m00004_geo_cache_and_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m00001_access_lists::Migration),
            Box::new(m00002_sessions_and_history::Migration),
            Box::new(m00003_subscription_access::Migration),
            Box::new(m00004_geo_cache_and_settings::Migration),
        ]
    }
}

pub async fn migrate_database(connection: &DatabaseConnection) -> Result<(), DbErr> {
    Migrator::up(connection, None).await
}
