//! View-layer boundary
//!
//! Cached read-view over a [`Session`] for a UI: a readiness flag, the
//! current festival's connections and profile, and commands that report
//! success as a boolean. Nothing here returns an error; failures are logged
//! and surface as `false`.

use crate::db::models::{Connection, NewConnection, ProfileData, UserProfile};
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

/// Snapshot of what the view shows
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub is_ready: bool,
    pub connections: Vec<Connection>,
    pub profile: Option<UserProfile>,
}

pub struct SessionView {
    session: Arc<Session>,
    state: RwLock<ViewState>,
}

impl SessionView {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            state: RwLock::new(ViewState::default()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Initialize the session, load connections and profile, mark ready
    pub async fn load(&self) {
        if let Err(e) = self.session.init().await {
            error!("Storage init failed: {}", e);
        }

        let (connections, profile) = self.fetch().await;
        let mut state = self.state.write().await;
        state.connections = connections;
        state.profile = profile;
        state.is_ready = true;
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.is_ready
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.state.read().await.connections.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.state.read().await.profile.clone()
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    /// Record a connection in the current festival and reload the list
    pub async fn add_connection(&self, draft: NewConnection) -> bool {
        match self.session.add_connection(draft).await {
            Ok(_) => {
                match self.session.get_connections().await {
                    Ok(connections) => self.state.write().await.connections = connections,
                    Err(e) => error!("Failed to reload connections: {}", e),
                }
                true
            }
            Err(e) => {
                error!("Failed to add connection: {}", e);
                false
            }
        }
    }

    /// Save the profile; a festival may be created on the way
    pub async fn save_profile(&self, data: ProfileData) -> bool {
        match self.session.save_profile(&data).await {
            Ok(saved) => {
                let connections = self.session.get_connections().await.unwrap_or_default();
                let mut state = self.state.write().await;
                state.profile = saved;
                state.connections = connections;
                true
            }
            Err(e) => {
                error!("Failed to save profile: {}", e);
                false
            }
        }
    }

    /// Reload connections and profile; does nothing before `load` completed
    pub async fn refresh_data(&self) {
        if !self.is_ready().await {
            return;
        }
        let (connections, profile) = self.fetch().await;
        let mut state = self.state.write().await;
        state.connections = connections;
        state.profile = profile;
    }

    async fn fetch(&self) -> (Vec<Connection>, Option<UserProfile>) {
        let (connections, profile) = tokio::join!(
            self.session.get_connections(),
            self.session.get_profile()
        );
        let connections = connections.unwrap_or_else(|e| {
            error!("Failed to load connections: {}", e);
            Vec::new()
        });
        let profile = profile.unwrap_or_else(|e| {
            error!("Failed to load profile: {}", e);
            None
        });
        (connections, profile)
    }
}
