//! Store opening and schema preparation
//!
//! Opening is idempotent: missing collections and indexes are created,
//! existing ones are synchronised additively and upgraded to the current
//! schema version. Existing data is never touched by an open.

use crate::config::StoreLocation;
use crate::db::migrations::{create_schema_version_table, run_migrations};
use crate::db::models::{Connection, Festival, UserProfile};
use crate::db::schema::{create_collection, sync_collection, CollectionSchema};
use crate::db::store::{Record, RecordStore};
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// All collections, in dependency order (referenced tables first)
pub fn collection_schemas() -> Vec<CollectionSchema> {
    vec![Festival::schema(), Connection::schema(), UserProfile::schema()]
}

/// Open the store at `location`
///
/// `StoreLocation::Unavailable` fails with `Error::StoreUnavailable`.
pub async fn open(location: &StoreLocation) -> Result<RecordStore> {
    match location {
        StoreLocation::File(path) => open_file(path).await,
        StoreLocation::Memory => open_memory().await,
        StoreLocation::Unavailable => Err(Error::StoreUnavailable),
    }
}

/// Open (creating if needed) a database file
pub async fn open_file(db_path: &Path) -> Result<RecordStore> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    prepare_schema(&pool).await?;
    Ok(RecordStore::new(pool))
}

/// Open a private in-memory database
///
/// Pinned to one connection that is never recycled, since every SQLite
/// in-memory connection is its own database.
pub async fn open_memory() -> Result<RecordStore> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    prepare_schema(&pool).await?;
    Ok(RecordStore::new(pool))
}

/// Create, synchronise and upgrade every collection
pub async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    let schemas = collection_schemas();
    for schema in &schemas {
        create_collection(pool, schema).await?;
    }
    for schema in &schemas {
        sync_collection(pool, schema).await?;
    }

    run_migrations(pool).await
}
