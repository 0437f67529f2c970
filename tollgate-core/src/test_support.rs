use std::sync::Arc;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::Mutex;
use tollgate_db_migrations::migrate_database;

/// Fresh migrated in-memory database. A single pooled connection keeps every
/// statement on the same sqlite instance.
pub(crate) async fn connect_test_db() -> Arc<Mutex<DatabaseConnection>> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    migrate_database(&db).await.unwrap();
    Arc::new(Mutex::new(db))
}
