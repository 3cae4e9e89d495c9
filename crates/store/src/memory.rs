//! In-memory store implementation for tests and single-process setups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AdminId, ChannelId, GuildId, PanelId, PanelKind};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::rows::{PanelRow, SessionRow};
use crate::traits::{PanelStore, SessionStore};

#[derive(Default)]
struct Inner {
    sessions: HashMap<(GuildId, AdminId), SessionRow>,
    panels: HashMap<PanelId, PanelRow>,
    fail_upsert_session: bool,
    fail_upsert_panel: bool,
    fail_session_after: Option<u32>,
}

/// In-memory store implementing both store traits.
///
/// Provides the same merge-on-conflict upsert semantics as the Postgres
/// backend, plus fail-injection switches for exercising the
/// persistence-failure rollback path.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next session upserts fail with `Unavailable`.
    pub async fn set_fail_on_upsert_session(&self, fail: bool) {
        self.inner.write().await.fail_upsert_session = fail;
    }

    /// Lets the next `successes` session upserts through, then fails the rest
    /// with `Unavailable`. Simulates a store going down mid-operation.
    pub async fn fail_session_upserts_after(&self, successes: u32) {
        self.inner.write().await.fail_session_after = Some(successes);
    }

    /// Makes the next panel upserts fail with `Unavailable`.
    pub async fn set_fail_on_upsert_panel(&self, fail: bool) {
        self.inner.write().await.fail_upsert_panel = fail;
    }

    /// Total number of stored sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Total number of stored panel rows.
    pub async fn panel_count(&self) -> usize {
        self.inner.read().await.panels.len()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn upsert_session(&self, row: &SessionRow) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_upsert_session {
            return Err(StoreError::Unavailable("injected session failure".into()));
        }
        if let Some(remaining) = inner.fail_session_after.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::Unavailable("injected session failure".into()));
            }
            *remaining -= 1;
        }
        let key = (row.guild, row.admin);
        match inner.sessions.get_mut(&key) {
            Some(existing) => {
                // Field merge: created_at keeps the stored value.
                let created_at = existing.created_at;
                *existing = row.clone();
                existing.created_at = created_at;
            }
            None => {
                inner.sessions.insert(key, row.clone());
            }
        }
        Ok(())
    }

    async fn get_session(&self, guild: GuildId, admin: AdminId) -> Result<Option<SessionRow>> {
        Ok(self.inner.read().await.sessions.get(&(guild, admin)).cloned())
    }

    async fn get_active_sessions(&self) -> Result<Vec<SessionRow>> {
        Ok(self.inner.read().await.sessions.values().cloned().collect())
    }

    async fn delete_session(&self, guild: GuildId, admin: AdminId) -> Result<()> {
        self.inner.write().await.sessions.remove(&(guild, admin));
        Ok(())
    }
}

#[async_trait]
impl PanelStore for InMemoryStore {
    async fn upsert_panel(&self, row: &PanelRow) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_upsert_panel {
            return Err(StoreError::Unavailable("injected panel failure".into()));
        }
        // Uniqueness per (kind, channel, guild): an insert colliding with an
        // existing triple updates that row in place and keeps its identity.
        let existing = inner
            .panels
            .values()
            .find(|p| p.kind == row.kind && p.channel == row.channel && p.guild == row.guild)
            .map(|p| p.id);
        match existing {
            Some(id) => {
                let panel = inner.panels.get_mut(&id).expect("id found above");
                panel.message = row.message;
                panel.title = row.title.clone();
                panel.updated_at = row.updated_at;
            }
            None => {
                inner.panels.insert(row.id, row.clone());
            }
        }
        Ok(())
    }

    async fn get_panel(
        &self,
        kind: &PanelKind,
        channel: ChannelId,
        guild: GuildId,
    ) -> Result<Option<PanelRow>> {
        Ok(self
            .inner
            .read()
            .await
            .panels
            .values()
            .find(|p| &p.kind == kind && p.channel == channel && p.guild == guild)
            .cloned())
    }

    async fn delete_panel(&self, id: PanelId) -> Result<()> {
        self.inner.write().await.panels.remove(&id);
        Ok(())
    }

    async fn list_panels(&self, guild: GuildId) -> Result<Vec<PanelRow>> {
        Ok(self
            .inner
            .read()
            .await
            .panels
            .values()
            .filter(|p| p.guild == guild)
            .cloned()
            .collect())
    }

    async fn list_guilds(&self) -> Result<Vec<GuildId>> {
        let mut guilds: Vec<GuildId> = self
            .inner
            .read()
            .await
            .panels
            .values()
            .map(|p| p.guild)
            .collect();
        guilds.sort();
        guilds.dedup();
        Ok(guilds)
    }
}
