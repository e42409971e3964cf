//! Domain repository
//!
//! Typed operations over festivals, connections and user profiles with the
//! rules the raw store does not enforce: a single active festival, and
//! connections that always carry a festival scope.

use crate::db::models::{
    Connection, ConnectionId, Festival, FestivalId, NewConnection, NewFestival, ProfileData,
    UserProfile,
};
use crate::db::store::{RecordStore, SqlValue, StoreTransaction};
use crate::time::now;
use crate::{Error, Result};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Repository {
    store: RecordStore,
}

impl Repository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Create a festival; `year` defaults to the current year
    ///
    /// An active draft deactivates every other festival in the same transaction.
    pub async fn add_festival(&self, draft: &NewFestival) -> Result<FestivalId> {
        if draft.name.trim().is_empty() {
            return Err(Error::InvalidInput("festival name is empty".to_string()));
        }

        let mut tx = self.store.transaction().await?;
        let id = FestivalId(tx.insert(draft).await?);
        if draft.is_active {
            activate_in(&mut tx, id).await?;
        }
        tx.commit().await?;

        info!("Created festival {} ({})", id, draft.name);
        Ok(id)
    }

    pub async fn get_all_festivals(&self) -> Result<Vec<Festival>> {
        self.store.get_all().await
    }

    pub async fn get_festival(&self, id: FestivalId) -> Result<Option<Festival>> {
        self.store.get(id.0).await
    }

    /// First active festival, or None
    pub async fn get_active_festival(&self) -> Result<Option<Festival>> {
        let festivals = self.get_all_festivals().await?;
        Ok(festivals.into_iter().find(|f| f.is_active))
    }

    /// Make `id` the only active festival
    ///
    /// Every festival is rewritten inside one transaction, so a failed write
    /// leaves the previous activation untouched.
    pub async fn set_active_festival(&self, id: FestivalId) -> Result<()> {
        let mut tx = self.store.transaction().await?;
        activate_in(&mut tx, id).await?;
        tx.commit().await?;

        info!("Active festival is now {}", id);
        Ok(())
    }

    /// Record a connection; the draft must already carry its festival scope
    pub async fn add_connection(&self, draft: &NewConnection) -> Result<ConnectionId> {
        let festival_id = draft.festival_id.ok_or_else(|| {
            Error::InvalidInput("connection draft has no festival scope".to_string())
        })?;

        let id = ConnectionId(self.store.insert(draft).await?);
        debug!("Added connection {} to festival {}", id, festival_id);
        Ok(id)
    }

    /// Connections of one festival, most recent scan first
    pub async fn get_connections_by_festival(&self, id: FestivalId) -> Result<Vec<Connection>> {
        let mut connections: Vec<Connection> = self
            .store
            .get_by_index("festival_id", SqlValue::from(id.0))
            .await?;
        connections.sort_by(|a, b| b.scanned_at.cmp(&a.scanned_at));
        Ok(connections)
    }

    /// Upsert the profile of `festival_id`, replacing any previous one
    pub async fn save_user_profile(
        &self,
        festival_id: FestivalId,
        data: &ProfileData,
    ) -> Result<UserProfile> {
        let profile = build_profile(festival_id, data);
        self.store.put(&profile).await?;
        debug!("Saved profile for festival {}", festival_id);
        Ok(profile)
    }

    pub async fn get_user_profile(&self, festival_id: FestivalId) -> Result<Option<UserProfile>> {
        self.store.get(festival_id.0).await
    }
}

pub(crate) fn build_profile(festival_id: FestivalId, data: &ProfileData) -> UserProfile {
    UserProfile {
        festival_id,
        name: data.name.clone(),
        festival: data.festival.clone(),
        whatsapp: data.whatsapp.clone(),
        instagram: data.instagram.clone(),
        updated_at: now(),
    }
}

/// Flip `is_active` on every festival so only `id` stays active
pub(crate) async fn activate_in(tx: &mut StoreTransaction, id: FestivalId) -> Result<()> {
    let festivals: Vec<Festival> = tx.get_all().await?;
    if !festivals.iter().any(|f| f.id == id) {
        return Err(Error::NotFound(format!("festival {}", id)));
    }

    for mut festival in festivals {
        let should_be_active = festival.id == id;
        if festival.is_active != should_be_active {
            festival.is_active = should_be_active;
            tx.put(&festival).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::open_memory;
    use chrono::{Duration, TimeZone, Utc};

    async fn repo() -> Repository {
        Repository::new(open_memory().await.unwrap())
    }

    fn connection(festival_id: FestivalId, name: &str, minutes: i64) -> NewConnection {
        let base = Utc.with_ymd_and_hms(2024, 7, 5, 12, 0, 0).unwrap();
        NewConnection {
            festival_id: Some(festival_id),
            name: name.to_string(),
            whatsapp: Some(format!("+{}", minutes)),
            festival: "Fest".to_string(),
            scanned_at: Some(base + Duration::minutes(minutes)),
            ..Default::default()
        }
    }

    async fn active_count(repo: &Repository) -> usize {
        repo.get_all_festivals()
            .await
            .unwrap()
            .iter()
            .filter(|f| f.is_active)
            .count()
    }

    #[tokio::test]
    async fn test_add_festival_fills_defaults() {
        let repo = repo().await;
        let id = repo.add_festival(&NewFestival::named("Fest")).await.unwrap();

        let festival = repo.get_festival(id).await.unwrap().unwrap();
        assert_eq!(festival.year, crate::time::current_year());
        assert!(!festival.is_active);
        assert!(repo.get_active_festival().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_festival_rejects_blank_name() {
        let repo = repo().await;
        let result = repo.add_festival(&NewFestival::named("  ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_activation_sequence_keeps_single_active() {
        let repo = repo().await;
        let mut ids = Vec::new();
        for name in ["A", "B", "C", "D"] {
            ids.push(repo.add_festival(&NewFestival::named(name)).await.unwrap());
        }

        for id in [ids[2], ids[0], ids[0], ids[3], ids[1]] {
            repo.set_active_festival(id).await.unwrap();
            assert_eq!(active_count(&repo).await, 1);
            assert_eq!(repo.get_active_festival().await.unwrap().unwrap().id, id);
        }
    }

    #[tokio::test]
    async fn test_active_draft_deactivates_others() {
        let repo = repo().await;
        let first = repo
            .add_festival(&NewFestival::named("A").active())
            .await
            .unwrap();
        let second = repo
            .add_festival(&NewFestival::named("B").active())
            .await
            .unwrap();

        assert_eq!(active_count(&repo).await, 1);
        let active = repo.get_active_festival().await.unwrap().unwrap();
        assert_eq!(active.id, second);
        assert_ne!(active.id, first);
    }

    #[tokio::test]
    async fn test_activate_unknown_festival_changes_nothing() {
        let repo = repo().await;
        let id = repo
            .add_festival(&NewFestival::named("A").active())
            .await
            .unwrap();

        let result = repo.set_active_festival(FestivalId(999)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(repo.get_active_festival().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_connections_sorted_most_recent_first() {
        let repo = repo().await;
        let id = repo.add_festival(&NewFestival::named("A")).await.unwrap();

        for minutes in [5, 40, 1, 22, 13] {
            repo.add_connection(&connection(id, "P", minutes))
                .await
                .unwrap();
        }

        let listed = repo.get_connections_by_festival(id).await.unwrap();
        assert_eq!(listed.len(), 5);
        for pair in listed.windows(2) {
            assert!(pair[0].scanned_at > pair[1].scanned_at);
        }
    }

    #[tokio::test]
    async fn test_connections_scoped_to_festival() {
        let repo = repo().await;
        let a = repo.add_festival(&NewFestival::named("A")).await.unwrap();
        let b = repo.add_festival(&NewFestival::named("B")).await.unwrap();

        repo.add_connection(&connection(a, "Sam", 1)).await.unwrap();
        repo.add_connection(&connection(b, "Kim", 2)).await.unwrap();

        let in_a = repo.get_connections_by_festival(a).await.unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].name, "Sam");
        assert_eq!(in_a[0].festival_id, a);
    }

    #[tokio::test]
    async fn test_connection_without_scope_rejected() {
        let repo = repo().await;
        let draft = NewConnection {
            name: "Sam".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            repo.add_connection(&draft).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_for_missing_festival_rejected() {
        let repo = repo().await;
        let result = repo.add_connection(&connection(FestivalId(77), "Sam", 1)).await;
        assert!(matches!(result, Err(Error::Write(_))));
    }

    #[tokio::test]
    async fn test_scanned_at_defaults_to_now() {
        let repo = repo().await;
        let id = repo.add_festival(&NewFestival::named("A")).await.unwrap();
        let before = now();

        let mut draft = connection(id, "Sam", 0);
        draft.scanned_at = None;
        repo.add_connection(&draft).await.unwrap();

        let listed = repo.get_connections_by_festival(id).await.unwrap();
        assert!(listed[0].scanned_at >= before);
    }

    #[tokio::test]
    async fn test_profile_upsert_keeps_one_per_festival() {
        let repo = repo().await;
        let id = repo.add_festival(&NewFestival::named("A")).await.unwrap();

        let first = ProfileData {
            name: "A".to_string(),
            festival: "F1".to_string(),
            ..Default::default()
        };
        let second = ProfileData {
            name: "B".to_string(),
            festival: "F1".to_string(),
            whatsapp: Some("+44".to_string()),
            ..Default::default()
        };
        repo.save_user_profile(id, &first).await.unwrap();
        repo.save_user_profile(id, &second).await.unwrap();

        let all: Vec<UserProfile> = repo.store().get_all().await.unwrap();
        assert_eq!(all.len(), 1);

        let stored = repo.get_user_profile(id).await.unwrap().unwrap();
        assert_eq!(stored.name, "B");
        assert_eq!(stored.whatsapp.as_deref(), Some("+44"));
    }
}
