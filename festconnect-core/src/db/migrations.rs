//! Versioned schema upgrades
//!
//! The persisted schema version is a single integer in `schema_version`.
//! Upgrades run in order, each one additive and idempotent. There is no
//! downgrade path: a database newer than the code is opened as-is.
//!
//! # Guidelines
//!
//! 1. Never modify an existing upgrade step
//! 2. Add a new step for every schema change and bump `CURRENT_SCHEMA_VERSION`
//! 3. Add collections, columns and indexes; never drop or rewrite user data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

pub async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn current_schema_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending upgrades
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = current_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({}); opening without changes",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Upgrading database schema: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        set_schema_version(pool, 1).await?;
        info!("Schema v1 recorded (baseline collections)");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Schema v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("Schema v3 completed");
    }

    Ok(())
}

/// v2: restore the single-active-festival invariant
///
/// Databases written before activation became transactional may carry more
/// than one active festival. The most recently created one stays active.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE festivals SET is_active = 0
        WHERE is_active != 0
          AND id != (SELECT MAX(id) FROM festivals WHERE is_active != 0)
        "#,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        warn!(
            "Deactivated {} extra active festival(s)",
            result.rows_affected()
        );
    }
    Ok(())
}

/// v3: record of imported legacy payloads
///
/// Lets a repeated legacy import recognise a payload that was already
/// committed but whose keys could not be deleted.
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS legacy_imports (
            fingerprint TEXT PRIMARY KEY,
            festival_id INTEGER NOT NULL REFERENCES festivals(id),
            imported_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::{open_memory, prepare_schema};

    #[tokio::test]
    async fn test_fresh_store_is_at_current_version() {
        let store = open_memory().await.unwrap();
        let version = current_schema_version(store.pool()).await.unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let store = open_memory().await.unwrap();
        prepare_schema(store.pool()).await.unwrap();
        run_migrations(store.pool()).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(rows, CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_v2_keeps_latest_active_festival() {
        let store = open_memory().await.unwrap();
        let pool = store.pool();

        sqlx::query("DELETE FROM schema_version WHERE version >= 2")
            .execute(pool)
            .await
            .unwrap();
        for name in ["A", "B", "C"] {
            sqlx::query(
                "INSERT INTO festivals (name, year, created_at, is_active) VALUES (?, 2024, CURRENT_TIMESTAMP, 1)",
            )
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        }

        run_migrations(pool).await.unwrap();

        let active: Vec<String> =
            sqlx::query_scalar("SELECT name FROM festivals WHERE is_active != 0")
                .fetch_all(pool)
                .await
                .unwrap();
        assert_eq!(active, vec!["C".to_string()]);
        assert_eq!(current_schema_version(pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
