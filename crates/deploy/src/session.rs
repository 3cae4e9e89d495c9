//! The wizard session and its state machine.
//!
//! A session walks an ordered goal list one panel at a time:
//! `Selecting → AwaitingTarget → Confirming → Deploying`, looping back to
//! `AwaitingTarget` after each success until the cursor reaches the end
//! (`Completed`). `Failed` is non-terminal: the admin can retry the same goal
//! or cancel.

use chrono::{DateTime, Utc};
use common::{AdminId, ChannelId, GuildId, PanelKind};
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::rollback::RollbackEntry;
use store::SessionRow;

/// The composite key a session lives under: one wizard per admin per guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub guild: GuildId,
    pub admin: AdminId,
}

impl SessionKey {
    pub fn new(guild: GuildId, admin: AdminId) -> Self {
        Self { guild, admin }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.guild, self.admin)
    }
}

/// Where the wizard stands for the goal at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Goals are being chosen; leaves this state as soon as the wizard starts.
    Selecting,
    /// Waiting for the admin to pick a destination channel.
    AwaitingTarget,
    /// Target chosen; waiting for the admin to confirm the deploy.
    Confirming,
    /// A deploy transaction is in flight.
    Deploying,
    /// The last deploy attempt failed; retry or cancel.
    Failed,
    /// Every goal deployed. Terminal.
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Selecting => "selecting",
            SessionState::AwaitingTarget => "awaiting_target",
            SessionState::Confirming => "confirming",
            SessionState::Deploying => "deploying",
            SessionState::Failed => "failed",
            SessionState::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "selecting" => Some(SessionState::Selecting),
            "awaiting_target" => Some(SessionState::AwaitingTarget),
            "confirming" => Some(SessionState::Confirming),
            "deploying" => Some(SessionState::Deploying),
            "failed" => Some(SessionState::Failed),
            "completed" => Some(SessionState::Completed),
            _ => None,
        }
    }

    /// True when a target channel may be selected.
    pub fn can_select_target(&self) -> bool {
        matches!(self, SessionState::AwaitingTarget)
    }

    /// True when the deploy may be confirmed (including retry after failure).
    pub fn can_confirm(&self) -> bool {
        matches!(self, SessionState::Confirming | SessionState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One live wizard session.
///
/// The in-flight rollback stack is never held here; while a deploy runs it
/// lives in the transaction and is journaled straight to the store, so the
/// in-memory copy stays empty by the time the session is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub goals: Vec<PanelKind>,
    pub cursor: usize,
    pub completed: Vec<PanelKind>,
    pub state: SessionState,
    pub target: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Set once the session is cancelled or completed; stale handles to the
    /// registry entry must not resurrect it.
    pub(crate) closed: bool,
}

impl Session {
    pub fn new(key: SessionKey, goals: Vec<PanelKind>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            goals,
            cursor: 0,
            completed: Vec::new(),
            state: SessionState::Selecting,
            target: None,
            created_at: now,
            last_activity_at: now,
            closed: false,
        }
    }

    /// The goal the cursor points at, if any remain.
    pub fn current_goal(&self) -> Option<&PanelKind> {
        self.goals.get(self.cursor)
    }

    pub fn remaining(&self) -> usize {
        self.goals.len().saturating_sub(self.cursor)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// `Selecting → AwaitingTarget`, once the goal list is fixed.
    pub fn begin_targeting(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect(SessionState::Selecting, "selecting")?;
        self.state = SessionState::AwaitingTarget;
        self.touch(now);
        Ok(())
    }

    /// `AwaitingTarget → Confirming`, fixing the destination channel.
    pub fn select_target(&mut self, channel: ChannelId, now: DateTime<Utc>) -> Result<()> {
        if !self.state.can_select_target() {
            return Err(DeployError::InvalidState {
                expected: "awaiting_target",
                actual: self.state,
            });
        }
        self.target = Some(channel);
        self.state = SessionState::Confirming;
        self.touch(now);
        Ok(())
    }

    /// `Confirming|Failed → Deploying`. Retry from `Failed` keeps the cursor
    /// and the previously selected target.
    pub fn begin_deploy(&mut self, now: DateTime<Utc>) -> Result<ChannelId> {
        if !self.state.can_confirm() {
            return Err(DeployError::InvalidState {
                expected: "confirming or failed",
                actual: self.state,
            });
        }
        let target = self.target.ok_or_else(|| DeployError::CorruptSession {
            reason: "confirmable state with no target selected".to_owned(),
        })?;
        self.state = SessionState::Deploying;
        self.touch(now);
        Ok(target)
    }

    /// `Deploying → AwaitingTarget|Completed`: records the goal as done and
    /// advances the cursor.
    pub fn mark_success(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect(SessionState::Deploying, "deploying")?;
        if let Some(goal) = self.goals.get(self.cursor).cloned() {
            if !self.completed.contains(&goal) {
                self.completed.push(goal);
            }
        }
        self.cursor += 1;
        self.target = None;
        self.state = if self.cursor < self.goals.len() {
            SessionState::AwaitingTarget
        } else {
            SessionState::Completed
        };
        self.touch(now);
        Ok(())
    }

    /// `Deploying → Failed`: cursor and target stay put for a retry.
    pub fn mark_failure(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect(SessionState::Deploying, "deploying")?;
        self.state = SessionState::Failed;
        self.touch(now);
        Ok(())
    }

    fn expect(&self, state: SessionState, name: &'static str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(DeployError::InvalidState {
                expected: name,
                actual: self.state,
            })
        }
    }

    /// Snapshot for persistence. The stored rollback stack is written empty;
    /// while a deploy is in flight the journal maintains it directly.
    pub fn to_row(&self) -> SessionRow {
        SessionRow {
            guild: self.key.guild,
            admin: self.key.admin,
            goals: self.goals.clone(),
            cursor: self.cursor as u32,
            completed: self.completed.clone(),
            state: self.state.as_str().to_owned(),
            target: self.target,
            rollback_stack: serde_json::Value::Array(Vec::new()),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }

    /// Rebuilds a session from its stored row.
    ///
    /// Also returns whatever rollback stack the row still carries, so the
    /// caller can replay a stack left behind by a crash mid-deploy.
    pub fn from_row(row: &SessionRow) -> Result<(Self, Vec<RollbackEntry>)> {
        let state =
            SessionState::parse(&row.state).ok_or_else(|| DeployError::CorruptSession {
                reason: format!("unknown state '{}'", row.state),
            })?;
        let cursor = row.cursor as usize;
        if cursor > row.goals.len() {
            return Err(DeployError::CorruptSession {
                reason: format!("cursor {cursor} exceeds {} goals", row.goals.len()),
            });
        }
        let residual: Vec<RollbackEntry> = serde_json::from_value(row.rollback_stack.clone())
            .map_err(|e| DeployError::CorruptSession {
                reason: format!("unreadable rollback stack: {e}"),
            })?;

        let session = Session {
            key: SessionKey::new(row.guild, row.admin),
            goals: row.goals.clone(),
            cursor,
            completed: row.completed.clone(),
            state,
            target: row.target,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
            closed: false,
        };
        Ok((session, residual))
    }
}
