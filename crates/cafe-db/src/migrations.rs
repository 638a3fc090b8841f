//! # Database Migrations
//!
//! The schema lives in `migrations/sqlite/` at the workspace root and is
//! compiled into the crate, so a fresh café install needs no SQL files.
//!
//! ```text
//! migrations/sqlite/
//! └── 001_document_collections.sql   orders · taxes · menu_items
//! ```
//!
//! Add a new numbered file for every schema change. Applied files are
//! checksummed in `_sqlx_migrations`; editing one breaks existing installs.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration, in file order. Safe to call on each
/// startup.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(known = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(known, applied)` migration counts, for health checks.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let known = MIGRATOR.migrations.len();

    // Before the first run the bookkeeping table does not exist yet.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((known, usize::try_from(applied).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        assert_eq!(migration_status(&pool).await.unwrap().1, 0);
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (known, applied) = migration_status(&pool).await.unwrap();
        assert_eq!(known, applied);
        assert!(known >= 1);
    }
}
