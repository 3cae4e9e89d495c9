//! Store capability traits.

use async_trait::async_trait;
use common::{AdminId, ChannelId, GuildId, PanelId, PanelKind};

use crate::rows::{PanelRow, SessionRow};
use crate::Result;

/// Durable store for wizard sessions.
///
/// Implementations must support safe concurrent upserts across unrelated
/// session keys; no cross-session locking is required of callers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or updates a session row.
    ///
    /// The upsert is a field merge: on conflict every mutable field takes the
    /// new value while `created_at` keeps the stored one. It must never
    /// behave as create-or-reset — resetting `cursor` or `completed` on
    /// conflict loses wizard progress.
    async fn upsert_session(&self, row: &SessionRow) -> Result<()>;

    /// Fetches one session by key.
    async fn get_session(&self, guild: GuildId, admin: AdminId) -> Result<Option<SessionRow>>;

    /// Returns every stored session.
    async fn get_active_sessions(&self) -> Result<Vec<SessionRow>>;

    /// Deletes a session. No error if it is already gone.
    async fn delete_session(&self, guild: GuildId, admin: AdminId) -> Result<()>;
}

/// Durable store for deployed panel records.
#[async_trait]
pub trait PanelStore: Send + Sync {
    /// Inserts or updates a panel row.
    ///
    /// At most one active row may exist per `(kind, channel, guild)`; on
    /// conflict the existing row is updated in place (`message`, `title`,
    /// `updated_at`) and keeps its `id`, `created_at` and `created_by`.
    async fn upsert_panel(&self, row: &PanelRow) -> Result<()>;

    /// Fetches the active panel for a `(kind, channel, guild)` triple.
    async fn get_panel(
        &self,
        kind: &PanelKind,
        channel: ChannelId,
        guild: GuildId,
    ) -> Result<Option<PanelRow>>;

    /// Deletes a panel row by ID. No error if it is already gone.
    async fn delete_panel(&self, id: PanelId) -> Result<()>;

    /// Lists all panel rows for one guild.
    async fn list_panels(&self, guild: GuildId) -> Result<Vec<PanelRow>>;

    /// Lists the distinct guilds that have panel rows (sweeper scan entry point).
    async fn list_guilds(&self) -> Result<Vec<GuildId>>;
}
