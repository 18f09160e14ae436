use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to connect to database: {0}")]
    Connect(#[from] DbErr),
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Open (creating if needed) the SQLite database at `db_path` and apply migrations.
pub async fn init(db_path: &str) -> Result<DatabaseConnection, InitError> {
    let abs_path = std::fs::canonicalize(db_path)
        .unwrap_or_else(|_| std::path::PathBuf::from(db_path));
    tracing::info!("Database absolute path: {:?}", abs_path);

    // Ensure parent directory exists
    if let Some(parent) = Path::new(db_path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let mut opts = ConnectOptions::new(format!("sqlite:{}?mode=rwc", db_path));
    opts.max_connections(5).sqlx_logging(false);

    connect(opts).await
}

/// Fresh in-memory database. A single connection keeps every query on the same database.
#[cfg(test)]
pub async fn init_memory() -> Result<DatabaseConnection, InitError> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);

    connect(opts).await
}

async fn connect(opts: ConnectOptions) -> Result<DatabaseConnection, InitError> {
    let db = Database::connect(opts).await?;
    run_migrations(&db).await?;
    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), InitError> {
    sqlx::migrate!("./migrations")
        .run(db.get_sqlite_connection_pool())
        .await?;

    tracing::info!("Database migrations applied successfully");
    Ok(())
}
