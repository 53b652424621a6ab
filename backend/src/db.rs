use sqlx::migrate::{MigrateError, Migrator};

use crate::config::DatabaseConfig;

#[cfg(not(any(feature = "db-sqlite", feature = "db-postgres")))]
compile_error!("Either the `db-sqlite` or `db-postgres` feature must be enabled.");

#[cfg(all(feature = "db-sqlite", feature = "db-postgres"))]
compile_error!("Only one of `db-sqlite` or `db-postgres` can be enabled.");

#[cfg(feature = "db-postgres")]
pub use sqlx::postgres::{PgPool as DbPool, PgPoolOptions as DbPoolOptions, Postgres as Db};

#[cfg(feature = "db-sqlite")]
pub use sqlx::sqlite::{Sqlite as Db, SqlitePool as DbPool, SqlitePoolOptions as DbPoolOptions};

#[cfg(feature = "db-sqlite")]
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

#[cfg(feature = "db-postgres")]
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    DbPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn migrate(pool: &DbPool) -> Result<(), MigrateError> {
    tracing::info!("Running database migrations...");
    MIGRATOR.run(pool).await?;
    tracing::info!("Migrations complete.");
    Ok(())
}
