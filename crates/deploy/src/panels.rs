//! Panel deployment.
//!
//! Panel content comes from external collaborators through the
//! [`PanelContentBuilder`] seam; this module only moves content onto the
//! platform and keeps the persisted record in step, inside one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use common::{AdminId, ChannelId, GuildId, PanelKind};
use platform::{MessageContent, PlatformClient};
use store::{PanelRow, PanelStore};

use crate::audit::{AuditEvent, AuditSink};
use crate::config::RetryPolicy;
use crate::error::{DeployError, Result};
use crate::provisioner::retry_platform;
use crate::rollback::{RollbackEntry, Transaction};

/// Rendered content for one panel: a record title plus the message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelContent {
    pub title: String,
    pub message: MessageContent,
}

/// Renders content for one panel kind.
///
/// Business features implement this; the orchestration core never knows what
/// a panel says, only how to place it.
#[async_trait]
pub trait PanelContentBuilder: Send + Sync {
    /// Renders the panel for the given guild.
    async fn build(&self, guild: GuildId) -> Result<PanelContent>;

    /// Component IDs the rendered message must carry. Validation checks the
    /// live message against this after deploy.
    fn expected_components(&self) -> Vec<String>;
}

/// A builder that always renders the same content. Used for fixed panels and
/// throughout the tests.
pub struct StaticPanelBuilder {
    content: PanelContent,
}

impl StaticPanelBuilder {
    pub fn new(title: impl Into<String>, message: MessageContent) -> Self {
        Self {
            content: PanelContent {
                title: title.into(),
                message,
            },
        }
    }
}

#[async_trait]
impl PanelContentBuilder for StaticPanelBuilder {
    async fn build(&self, _guild: GuildId) -> Result<PanelContent> {
        Ok(self.content.clone())
    }

    fn expected_components(&self) -> Vec<String> {
        self.content
            .message
            .components
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }
}

/// Maps panel kinds to their content builders.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<PanelKind, Arc<dyn PanelContentBuilder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: PanelKind, builder: Arc<dyn PanelContentBuilder>) {
        self.builders.insert(kind, builder);
    }

    /// Builder-style [`BuilderRegistry::register`].
    pub fn with(mut self, kind: PanelKind, builder: Arc<dyn PanelContentBuilder>) -> Self {
        self.register(kind, builder);
        self
    }

    pub fn get(&self, kind: &PanelKind) -> Result<Arc<dyn PanelContentBuilder>> {
        self.builders
            .get(kind)
            .cloned()
            .ok_or_else(|| DeployError::UnknownPanelKind(kind.clone()))
    }

    pub fn kinds(&self) -> Vec<PanelKind> {
        self.builders.keys().cloned().collect()
    }
}

/// Deploys one panel message and its persisted record atomically (via the
/// surrounding transaction's rollback stack).
pub struct PanelDeployer<P, S> {
    platform: Arc<P>,
    panels: Arc<S>,
    registry: Arc<BuilderRegistry>,
    retry: RetryPolicy,
    audit: Arc<dyn AuditSink>,
}

impl<P: PlatformClient, S: PanelStore> PanelDeployer<P, S> {
    pub fn new(
        platform: Arc<P>,
        panels: Arc<S>,
        registry: Arc<BuilderRegistry>,
        retry: RetryPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            platform,
            panels,
            registry,
            retry,
            audit,
        }
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Deploys (or redeploys) the panel of `kind` into `channel`.
    ///
    /// Redeploy edits the existing message in place when it is still alive;
    /// if the record exists but the message was deleted out from under it, a
    /// fresh message is sent and the record repointed. Either way the
    /// persisted record stays unique per `(kind, channel, guild)`. Each step
    /// records its compensation in `tx` immediately after it lands.
    #[tracing::instrument(skip(self, tx), fields(%guild, %channel, kind = %kind))]
    pub async fn deploy(
        &self,
        guild: GuildId,
        channel: ChannelId,
        kind: &PanelKind,
        actor: AdminId,
        tx: &mut Transaction,
    ) -> Result<PanelRow> {
        let builder = self.registry.get(kind)?;
        let content = builder.build(guild).await?;
        let existing = self.panels.get_panel(kind, channel, guild).await?;
        let now = Utc::now();

        let (row, replaced) = match existing {
            Some(prior) => {
                let live = retry_platform(&self.retry, "fetch_message", || {
                    self.platform.fetch_message(channel, prior.message)
                })
                .await;

                match live {
                    Ok(old_message) => {
                        // Message still up: edit in place, keep the ID stable.
                        retry_platform(&self.retry, "edit_message", || {
                            self.platform
                                .edit_message(channel, prior.message, content.message.clone())
                        })
                        .await?;
                        tx.record(RollbackEntry::RestoreMessage {
                            channel,
                            message: prior.message,
                            prior: old_message.content,
                        })
                        .await?;

                        let mut row = prior.clone();
                        row.title = content.title.clone();
                        row.updated_at = now;
                        self.panels.upsert_panel(&row).await?;
                        tx.record(RollbackEntry::RestorePanelRow { prior }).await?;
                        (row, true)
                    }
                    Err(err) if err.is_not_found() => {
                        // Record survived but the message is gone: repoint it.
                        let message = retry_platform(&self.retry, "send_message", || {
                            self.platform.send_message(channel, content.message.clone())
                        })
                        .await?;
                        tx.record(RollbackEntry::DeleteMessage { channel, message })
                            .await?;

                        let mut row = prior.clone();
                        row.message = message;
                        row.title = content.title.clone();
                        row.updated_at = now;
                        self.panels.upsert_panel(&row).await?;
                        tx.record(RollbackEntry::RestorePanelRow { prior }).await?;
                        (row, true)
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                let message = retry_platform(&self.retry, "send_message", || {
                    self.platform.send_message(channel, content.message.clone())
                })
                .await?;
                tx.record(RollbackEntry::DeleteMessage { channel, message })
                    .await?;

                let row = PanelRow::new(
                    kind.clone(),
                    guild,
                    channel,
                    message,
                    content.title.clone(),
                    actor,
                    now,
                );
                self.panels.upsert_panel(&row).await?;
                tx.record(RollbackEntry::DeletePanelRow { id: row.id }).await?;
                (row, false)
            }
        };

        metrics::counter!("guildsmith_deploy_panels_total").increment(1);
        self.audit
            .emit(AuditEvent::PanelDeployed {
                guild,
                channel,
                kind: kind.clone(),
                message: row.message,
                replaced,
            })
            .await;
        Ok(row)
    }
}
