//! Legacy key-value store import
//!
//! Older builds kept everything under two flat keys: `connections` (a JSON
//! array) and `userProfile` (a JSON object). On first start the session copies
//! them into a new active festival and deletes the keys.
//!
//! The copy runs in one transaction and the keys are deleted only after it
//! commits, so an interrupted import leaves the legacy data in place for the
//! next start. Each imported payload is fingerprinted inside the same
//! transaction; if the keys survive a committed import (deletion failed),
//! the next run recognises the payload and only finishes the deletion.

use crate::db::models::{
    ContactInfo, FestivalId, NewConnection, NewFestival, ProfileData,
};
use crate::db::store::RecordStore;
use crate::repository::{activate_in, build_profile};
use crate::time::{now, parse_timestamp};
use crate::{Error, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const LEGACY_CONNECTIONS_KEY: &str = "connections";
pub const LEGACY_PROFILE_KEY: &str = "userProfile";

/// Festival name used when the legacy profile names none
pub const LEGACY_FESTIVAL_NAME: &str = "Previous Festival";

/// Deprecated flat key-value storage
pub trait LegacyStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process legacy store
#[derive(Debug, Default)]
pub struct MemoryLegacyStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&self, key: &str, value: impl Into<String>) {
        self.lock().insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LegacyStore for MemoryLegacyStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Legacy store persisted as one JSON object of key → serialized value
///
/// A missing file is an empty store. Removal rewrites the file through a
/// temporary sibling and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileLegacyStore {
    path: PathBuf,
}

impl JsonFileLegacyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_map(&self, map: &BTreeMap<String, serde_json::Value>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LegacyStore for JsonFileLegacyStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let map = self.read_map()?;
        Ok(map.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Result of one import attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy keys present
    NothingToMigrate,
    /// Legacy data copied into a new active festival and keys deleted
    Migrated {
        festival_id: FestivalId,
        connections: usize,
        profile: bool,
    },
    /// Payload had been imported before; only the key deletion was finished
    AlreadyImported { festival_id: FestivalId },
}

/// Connection as stored by older builds
///
/// Two shapes exist: flat handles with `scannedAt`, and the scan-page shape
/// with `contactInfo` and `timestamp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConnection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    whatsapp: Option<String>,
    #[serde(default)]
    instagram: Option<String>,
    #[serde(default)]
    contact_info: Option<ContactInfo>,
    #[serde(default)]
    festival: Option<String>,
    #[serde(default)]
    scanned_at: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    qr_data: Option<String>,
}

impl LegacyConnection {
    fn into_draft(self, festival_id: FestivalId, festival_name: &str, raw: String) -> NewConnection {
        let contact = self.contact_info.unwrap_or_default();
        let scanned_at = self
            .scanned_at
            .or(self.timestamp)
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(now);

        NewConnection {
            festival_id: Some(festival_id),
            name: self.name,
            whatsapp: self.whatsapp.or(contact.whatsapp),
            instagram: self.instagram.or(contact.instagram),
            festival: self
                .festival
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| festival_name.to_string()),
            scanned_at: Some(scanned_at),
            qr_data: self.qr_data.unwrap_or(raw),
        }
    }
}

/// Parsed legacy payload
struct LegacyPayload {
    connections: Vec<(LegacyConnection, String)>,
    profile: Option<ProfileData>,
    fingerprint: String,
}

fn parse_payload(connections: Option<&str>, profile: Option<&str>) -> Result<LegacyPayload> {
    let mut hasher = Sha256::new();
    hasher.update(connections.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(profile.unwrap_or_default().as_bytes());
    let fingerprint = format!("{:x}", hasher.finalize());

    let mut parsed_connections = Vec::new();
    if let Some(raw) = connections {
        let values: Vec<serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| Error::Migration(format!("legacy connections: {}", e)))?;
        for value in values {
            let text = value.to_string();
            let connection: LegacyConnection = serde_json::from_value(value)
                .map_err(|e| Error::Migration(format!("legacy connection {}: {}", text, e)))?;
            parsed_connections.push((connection, text));
        }
    }

    let parsed_profile = match profile {
        Some(raw) => Some(
            serde_json::from_str::<ProfileData>(raw)
                .map_err(|e| Error::Migration(format!("legacy profile: {}", e)))?,
        ),
        None => None,
    };

    Ok(LegacyPayload {
        connections: parsed_connections,
        profile: parsed_profile,
        fingerprint,
    })
}

/// Import legacy data into `store`
///
/// Errors leave both the store and the legacy keys unchanged.
pub async fn migrate_legacy(store: &RecordStore, legacy: &dyn LegacyStore) -> Result<MigrationOutcome> {
    let raw_connections = legacy.get_item(LEGACY_CONNECTIONS_KEY)?;
    let raw_profile = legacy.get_item(LEGACY_PROFILE_KEY)?;

    if raw_connections.is_none() && raw_profile.is_none() {
        return Ok(MigrationOutcome::NothingToMigrate);
    }

    info!("Migrating data from legacy store...");
    let payload = parse_payload(raw_connections.as_deref(), raw_profile.as_deref())?;

    let mut tx = store.transaction().await?;

    let previous: Option<i64> =
        sqlx::query_scalar("SELECT festival_id FROM legacy_imports WHERE fingerprint = ?")
            .bind(&payload.fingerprint)
            .fetch_optional(tx.connection())
            .await?;
    if let Some(festival_id) = previous {
        tx.rollback().await?;
        warn!(
            "Legacy payload already imported into festival {}; finishing cleanup",
            festival_id
        );
        remove_legacy_keys(legacy)?;
        return Ok(MigrationOutcome::AlreadyImported {
            festival_id: FestivalId(festival_id),
        });
    }

    let festival_name = payload
        .profile
        .as_ref()
        .map(|p| p.festival.trim())
        .filter(|f| !f.is_empty())
        .unwrap_or(LEGACY_FESTIVAL_NAME)
        .to_string();

    let festival_id = FestivalId(tx.insert(&NewFestival::named(&festival_name).active()).await?);
    activate_in(&mut tx, festival_id).await?;

    let connection_count = payload.connections.len();
    for (connection, raw) in payload.connections {
        tx.insert(&connection.into_draft(festival_id, &festival_name, raw))
            .await?;
    }

    let has_profile = payload.profile.is_some();
    if let Some(profile) = &payload.profile {
        tx.put(&build_profile(festival_id, profile)).await?;
    }

    sqlx::query("INSERT INTO legacy_imports (fingerprint, festival_id) VALUES (?, ?)")
        .bind(&payload.fingerprint)
        .bind(festival_id.0)
        .execute(tx.connection())
        .await
        .map_err(Error::write)?;

    tx.commit().await?;
    remove_legacy_keys(legacy)?;

    info!(
        "Migration complete: festival {} ({}), {} connection(s), profile: {}",
        festival_id, festival_name, connection_count, has_profile
    );
    Ok(MigrationOutcome::Migrated {
        festival_id,
        connections: connection_count,
        profile: has_profile,
    })
}

fn remove_legacy_keys(legacy: &dyn LegacyStore) -> Result<()> {
    legacy.remove_item(LEGACY_CONNECTIONS_KEY)?;
    legacy.remove_item(LEGACY_PROFILE_KEY)?;
    Ok(())
}
