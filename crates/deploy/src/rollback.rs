//! Compensating rollback: a transaction records undo entries as side effects
//! land, and the coordinator replays them in strict reverse order when a step
//! fails.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::{ChannelId, GuildId, MessageId, PanelId};
use platform::{MessageContent, Overwrite, OverwriteTarget, PlatformClient, ResourceRef};
use store::{PanelRow, PanelStore};

use crate::audit::{AuditEvent, AuditSink};
use crate::error::Result;

/// One compensating action, recorded immediately after the effect it undoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RollbackEntry {
    /// Delete a freshly created guild resource.
    DeleteResource { guild: GuildId, resource: ResourceRef },
    /// Delete a freshly sent panel message.
    DeleteMessage { channel: ChannelId, message: MessageId },
    /// Remove a freshly inserted panel record.
    DeletePanelRow { id: PanelId },
    /// Restore a panel record to its pre-deploy contents.
    RestorePanelRow { prior: PanelRow },
    /// Restore a message edited in place to its prior content.
    RestoreMessage {
        channel: ChannelId,
        message: MessageId,
        prior: MessageContent,
    },
    /// Restore an overwrite set captured before an edit.
    RestoreOverwrites {
        guild: GuildId,
        target: OverwriteTarget,
        prior: Vec<Overwrite>,
    },
}

impl RollbackEntry {
    /// Short human label for logs and audit records.
    pub fn describe(&self) -> String {
        match self {
            Self::DeleteResource { resource, .. } => format!("delete {resource}"),
            Self::DeleteMessage { message, .. } => format!("delete message {message}"),
            Self::DeletePanelRow { id } => format!("delete panel row {id}"),
            Self::RestorePanelRow { prior } => format!("restore panel row {}", prior.id),
            Self::RestoreMessage { message, .. } => format!("restore message {message}"),
            Self::RestoreOverwrites { target, .. } => match target {
                OverwriteTarget::Category(id) => format!("restore overwrites on category {id}"),
                OverwriteTarget::Channel(id) => format!("restore overwrites on channel {id}"),
            },
        }
    }
}

/// Observer notified after every change to an in-flight rollback stack.
///
/// Implementations persist the stack so a crash mid-transaction leaves a
/// replayable record behind.
#[async_trait]
pub trait StackJournal: Send + Sync {
    async fn stack_changed(&self, entries: &[RollbackEntry]) -> Result<()>;
}

/// An in-flight unit of work accumulating compensations.
///
/// Callers record an entry only after the corresponding effect succeeds, so
/// the stack never names work that did not happen.
pub struct Transaction {
    name: String,
    entries: Vec<RollbackEntry>,
    journal: Option<Arc<dyn StackJournal>>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            journal: None,
        }
    }

    pub fn with_journal(name: impl Into<String>, journal: Arc<dyn StackJournal>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            journal: Some(journal),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pushes a compensation and journals the updated stack.
    pub async fn record(&mut self, entry: RollbackEntry) -> Result<()> {
        self.entries.push(entry);
        if let Some(journal) = &self.journal {
            journal.stack_changed(&self.entries).await?;
        }
        Ok(())
    }

    /// Drops all entries without replaying them. Called on commit.
    pub fn discard(&mut self) {
        self.entries.clear();
    }

    /// Takes ownership of the recorded entries, leaving the transaction empty.
    pub fn take_entries(&mut self) -> Vec<RollbackEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn entries(&self) -> &[RollbackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replays rollback stacks in reverse, best-effort per entry.
pub struct RollbackCoordinator<P, S> {
    platform: Arc<P>,
    panels: Arc<S>,
    audit: Arc<dyn AuditSink>,
}

impl<P: PlatformClient, S: PanelStore> RollbackCoordinator<P, S> {
    pub fn new(platform: Arc<P>, panels: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            platform,
            panels,
            audit,
        }
    }

    /// Unwinds a live transaction. Returns the number of entries that failed
    /// to replay; a failed entry is logged and skipped, never retried.
    pub async fn unwind(&self, tx: &mut Transaction) -> usize {
        let name = tx.name().to_owned();
        let entries = tx.take_entries();
        self.unwind_entries(&name, entries).await
    }

    /// Unwinds a recovered stack (e.g. one a crashed process left behind).
    pub async fn unwind_entries(&self, name: &str, entries: Vec<RollbackEntry>) -> usize {
        let mut failures = 0usize;
        for entry in entries.into_iter().rev() {
            let label = entry.describe();
            match self.undo(&entry).await {
                Ok(()) => {
                    metrics::counter!("guildsmith_rollback_entries_replayed_total").increment(1);
                    self.audit
                        .emit(AuditEvent::RollbackExecuted {
                            transaction: name.to_owned(),
                            entry: label,
                            ok: true,
                        })
                        .await;
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(
                        transaction = name,
                        entry = %label,
                        error = %err,
                        "rollback entry failed, continuing"
                    );
                    metrics::counter!("guildsmith_rollback_replay_failures_total").increment(1);
                    self.audit
                        .emit(AuditEvent::RollbackExecuted {
                            transaction: name.to_owned(),
                            entry: label,
                            ok: false,
                        })
                        .await;
                }
            }
        }
        failures
    }

    async fn undo(&self, entry: &RollbackEntry) -> Result<()> {
        let result = match entry {
            RollbackEntry::DeleteResource { guild, resource } => match resource {
                ResourceRef::Role(id) => self.platform.delete_role(*guild, *id).await,
                ResourceRef::Category(id) => self.platform.delete_category(*guild, *id).await,
                ResourceRef::Channel(id) => self.platform.delete_channel(*guild, *id).await,
            },
            RollbackEntry::DeleteMessage { channel, message } => {
                self.platform.delete_message(*channel, *message).await
            }
            RollbackEntry::DeletePanelRow { id } => {
                self.panels.delete_panel(*id).await?;
                return Ok(());
            }
            RollbackEntry::RestorePanelRow { prior } => {
                self.panels.upsert_panel(prior).await?;
                return Ok(());
            }
            RollbackEntry::RestoreMessage {
                channel,
                message,
                prior,
            } => {
                self.platform
                    .edit_message(*channel, *message, prior.clone())
                    .await
            }
            RollbackEntry::RestoreOverwrites {
                guild,
                target,
                prior,
            } => self
                .platform
                .edit_overwrites(*guild, target.clone(), prior.clone())
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => Ok(()),
            // Already gone counts as undone.
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
