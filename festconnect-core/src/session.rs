//! Session façade
//!
//! Entry point for callers. A [`Session`] is constructed explicitly with its
//! store configuration and optional legacy store, then shared (usually in an
//! `Arc`) by whoever needs it. Every operation first makes sure the session
//! is initialized: the store is opened and the legacy import has run.
//!
//! Initialization is guarded by one shared cell. Concurrent first callers
//! all wait on the same in-flight initialization, so store creation and the
//! legacy import never run twice. A failed open leaves the cell empty and the
//! next call retries.
//!
//! Read paths are lenient (no festival or no store means empty results);
//! write paths are strict (`NoActiveFestival`).

use crate::config::StoreConfig;
use crate::db::init::open;
use crate::db::models::{
    Connection, ConnectionId, Festival, FestivalId, NewConnection, NewFestival, ProfileData,
    ScannedContact, UserProfile,
};
use crate::dedup::is_duplicate;
use crate::legacy::{migrate_legacy, LegacyStore, MigrationOutcome};
use crate::repository::Repository;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Festival name used when a profile is saved before any festival exists
pub const DEFAULT_FESTIVAL_NAME: &str = "My Festival";

enum Backend {
    Ready(Repository),
    /// No persistent storage: reads are empty, writes are no-ops
    Headless,
}

/// Result of recording a scanned contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Added(ConnectionId),
    /// Same name and handle already recorded for this festival
    Duplicate { name: String },
}

pub struct Session {
    config: StoreConfig,
    legacy: Option<Arc<dyn LegacyStore>>,
    backend: OnceCell<Backend>,
}

impl Session {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            legacy: None,
            backend: OnceCell::new(),
        }
    }

    /// Import from `legacy` during initialization
    pub fn with_legacy(mut self, legacy: Arc<dyn LegacyStore>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Open the store and run the legacy import, once
    ///
    /// No-op when already initialized. Without storage capability the session
    /// initializes headless instead of failing.
    pub async fn init(&self) -> Result<()> {
        self.backend
            .get_or_try_init(|| self.initialize())
            .await
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.initialized()
    }

    pub fn is_headless(&self) -> bool {
        matches!(self.backend.get(), Some(Backend::Headless))
    }

    async fn initialize(&self) -> Result<Backend> {
        let store = match open(&self.config.location).await {
            Ok(store) => store,
            Err(Error::StoreUnavailable) => {
                warn!("No persistent storage available; running headless");
                return Ok(Backend::Headless);
            }
            Err(e) => {
                error!("Storage init failed: {}", e);
                return Err(e);
            }
        };

        if let Some(legacy) = &self.legacy {
            match migrate_legacy(&store, legacy.as_ref()).await {
                Ok(MigrationOutcome::NothingToMigrate) => {}
                Ok(outcome) => info!("Legacy import: {:?}", outcome),
                Err(e) => error!("Migration failed, legacy data kept for retry: {}", e),
            }
        }

        info!("Storage initialized");
        Ok(Backend::Ready(Repository::new(store)))
    }

    /// Repository once initialized; None when headless
    async fn repository(&self) -> Result<Option<&Repository>> {
        self.init().await?;
        Ok(match self.backend.get() {
            Some(Backend::Ready(repo)) => Some(repo),
            _ => None,
        })
    }

    /// Repository for read paths: init failures read as "no store"
    async fn read_repository(&self) -> Option<&Repository> {
        match self.repository().await {
            Ok(repo) => repo,
            Err(e) => {
                warn!("Reading without storage: {}", e);
                None
            }
        }
    }

    pub async fn get_current_festival(&self) -> Result<Option<Festival>> {
        match self.read_repository().await {
            Some(repo) => repo.get_active_festival().await,
            None => Ok(None),
        }
    }

    /// Record a connection in the active festival
    ///
    /// The festival scope is always taken from the active festival; an empty
    /// display label falls back to the festival's name.
    pub async fn add_connection(&self, mut draft: NewConnection) -> Result<ConnectionId> {
        let (repo, festival) = self.write_scope().await?;

        draft.festival_id = Some(festival.id);
        if draft.festival.is_empty() {
            draft.festival = festival.name.clone();
        }
        repo.add_connection(&draft).await
    }

    /// Duplicate-check a scan against the active festival, then record it
    pub async fn add_scanned_connection(
        &self,
        scanned: ScannedContact,
        raw: impl Into<String>,
    ) -> Result<ScanOutcome> {
        let (repo, festival) = self.write_scope().await?;
        let draft = scanned.into_new_connection(raw);

        let existing = repo.get_connections_by_festival(festival.id).await?;
        if is_duplicate(&draft, &existing) {
            info!("{} is already in festival {}", draft.name, festival.id);
            return Ok(ScanOutcome::Duplicate { name: draft.name });
        }

        let id = self.add_connection(draft).await?;
        Ok(ScanOutcome::Added(id))
    }

    /// Connections of the active festival; empty when there is none
    pub async fn get_connections(&self) -> Result<Vec<Connection>> {
        let Some(repo) = self.read_repository().await else {
            return Ok(Vec::new());
        };
        match repo.get_active_festival().await? {
            Some(festival) => repo.get_connections_by_festival(festival.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Active festival, creating and activating one named `label` if none exists
    ///
    /// Returns None when headless.
    pub async fn ensure_festival(&self, label: &str) -> Result<Option<Festival>> {
        let Some(repo) = self.repository().await? else {
            return Ok(None);
        };
        if let Some(festival) = repo.get_active_festival().await? {
            return Ok(Some(festival));
        }

        let name = match label.trim() {
            "" => DEFAULT_FESTIVAL_NAME,
            trimmed => trimmed,
        };
        let id = repo.add_festival(&NewFestival::named(name).active()).await?;
        info!("No active festival; created festival {} ({})", id, name);

        repo.get_festival(id)
            .await?
            .map(Some)
            .ok_or_else(|| Error::NotFound(format!("festival {}", id)))
    }

    /// Save the profile of the active festival, creating a festival first if needed
    ///
    /// Returns None when headless.
    pub async fn save_profile(&self, data: &ProfileData) -> Result<Option<UserProfile>> {
        let Some(festival) = self.ensure_festival(&data.festival).await? else {
            info!("Headless session; profile not persisted");
            return Ok(None);
        };
        let Some(repo) = self.repository().await? else {
            return Ok(None);
        };
        repo.save_user_profile(festival.id, data).await.map(Some)
    }

    /// Profile of the active festival; None when there is none
    pub async fn get_profile(&self) -> Result<Option<UserProfile>> {
        let Some(repo) = self.read_repository().await else {
            return Ok(None);
        };
        match repo.get_active_festival().await? {
            Some(festival) => repo.get_user_profile(festival.id).await,
            None => Ok(None),
        }
    }

    pub async fn list_festivals(&self) -> Result<Vec<Festival>> {
        match self.read_repository().await {
            Some(repo) => repo.get_all_festivals().await,
            None => Ok(Vec::new()),
        }
    }

    /// Create a festival explicitly
    pub async fn create_festival(&self, draft: &NewFestival) -> Result<FestivalId> {
        self.repository()
            .await?
            .ok_or(Error::StoreUnavailable)?
            .add_festival(draft)
            .await
    }

    /// Make `id` the active festival
    pub async fn switch_festival(&self, id: FestivalId) -> Result<()> {
        self.repository()
            .await?
            .ok_or(Error::StoreUnavailable)?
            .set_active_festival(id)
            .await
    }

    /// Repository and active festival for a write; fails without a festival
    async fn write_scope(&self) -> Result<(&Repository, Festival)> {
        let repo = self.repository().await?.ok_or(Error::NoActiveFestival)?;
        let festival = repo
            .get_active_festival()
            .await?
            .ok_or(Error::NoActiveFestival)?;
        Ok((repo, festival))
    }
}
