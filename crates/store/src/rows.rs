//! Persisted row shapes.

use chrono::{DateTime, Utc};
use common::{AdminId, ChannelId, GuildId, MessageId, PanelId, PanelKind};
use serde::{Deserialize, Serialize};

/// One persisted wizard session, keyed by `(guild, admin)`.
///
/// `state` is the session-machine state name and `rollback_stack` the
/// serialized in-flight compensation entries; both are opaque to the store —
/// the deploy crate owns their meaning. The stack is non-empty in a stored
/// row only when the process died mid-step, which is exactly what the
/// sweeper looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub guild: GuildId,
    pub admin: AdminId,
    pub goals: Vec<PanelKind>,
    pub cursor: u32,
    pub completed: Vec<PanelKind>,
    pub state: String,
    pub target: Option<ChannelId>,
    pub rollback_stack: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionRow {
    /// Returns true if the row has seen no activity for longer than `ttl`.
    pub fn is_idle(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > ttl
    }
}

/// One deployed panel, at most one active row per `(kind, channel, guild)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub id: PanelId,
    pub kind: PanelKind,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub message: MessageId,
    pub title: String,
    pub created_by: AdminId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PanelRow {
    /// Creates a fresh row for a first-time deploy.
    pub fn new(
        kind: PanelKind,
        guild: GuildId,
        channel: ChannelId,
        message: MessageId,
        title: impl Into<String>,
        created_by: AdminId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PanelId::new(),
            kind,
            guild,
            channel,
            message,
            title: title.into(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
