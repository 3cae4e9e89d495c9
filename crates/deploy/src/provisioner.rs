//! Idempotent resource provisioning.
//!
//! Every `ensure_*` operation looks the resource up by name in its scope
//! first and creates it only on absence, so re-running a blueprint never
//! duplicates anything. Each creation records a compensating delete in the
//! caller's transaction before the next step runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use common::{CategoryId, ChannelId, GuildId, RoleId};
use platform::{
    CategoryCreate, ChannelCreate, Overwrite, OverwriteTarget, PlatformClient, ResourceRef,
    RoleCreate,
};
use serde::Serialize;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::RetryPolicy;
use crate::error::{DeployError, Result};
use crate::rollback::{RollbackEntry, Transaction};

/// Outcome of an `ensure_*` call: the resource ID plus whether this call
/// created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provisioned<T> {
    pub id: T,
    pub is_new: bool,
}

/// Created/reused counts from a full blueprint apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub roles_created: usize,
    pub roles_reused: usize,
    pub categories_created: usize,
    pub categories_reused: usize,
    pub channels_created: usize,
    pub channels_reused: usize,
    pub overwrite_targets: usize,
}

impl ApplySummary {
    /// Total resources this apply created.
    pub fn created(&self) -> usize {
        self.roles_created + self.categories_created + self.channels_created
    }
}

/// Runs a platform call under the retry policy. Only transient errors are
/// retried; everything else propagates on the first failure.
pub(crate) async fn retry_platform<T, F, Fut>(
    retry: &RetryPolicy,
    action: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = platform::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let backoff = retry.backoff_for(attempt);
                tracing::debug!(
                    action,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient platform error, retrying"
                );
                metrics::counter!("guildsmith_provision_retries_total").increment(1);
                tokio::time::sleep(backoff).await;
            }
            Err(err) if err.is_transient() => {
                return Err(DeployError::Transient {
                    action: action.to_owned(),
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Idempotent create-or-reuse of platform resources.
pub struct Provisioner<P> {
    platform: Arc<P>,
    retry: RetryPolicy,
    audit: Arc<dyn AuditSink>,
}

impl<P: PlatformClient> Provisioner<P> {
    pub fn new(platform: Arc<P>, retry: RetryPolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            platform,
            retry,
            audit,
        }
    }

    async fn with_retry<T, F, Fut>(&self, action: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = platform::Result<T>>,
    {
        retry_platform(&self.retry, action, op).await
    }

    /// Ensures a role with the given name exists, creating it if absent.
    #[tracing::instrument(skip(self, tx), fields(role = %spec.name))]
    pub async fn ensure_role(
        &self,
        guild: GuildId,
        spec: &blueprint::RoleSpec,
        tx: &mut Transaction,
    ) -> Result<Provisioned<RoleId>> {
        if let Some(id) = self
            .with_retry("find_role", || self.platform.find_role(guild, &spec.name))
            .await?
        {
            self.note_provisioned(guild, ResourceRef::Role(id), &spec.name, false)
                .await;
            return Ok(Provisioned { id, is_new: false });
        }

        let create = RoleCreate {
            name: spec.name.clone(),
            permissions: spec.permissions.clone(),
        };
        let id = self
            .with_retry("create_role", || {
                self.platform.create_role(guild, create.clone())
            })
            .await?;
        tx.record(RollbackEntry::DeleteResource {
            guild,
            resource: ResourceRef::Role(id),
        })
        .await?;
        self.note_provisioned(guild, ResourceRef::Role(id), &spec.name, true)
            .await;
        Ok(Provisioned { id, is_new: true })
    }

    /// Ensures a category with the given name exists.
    #[tracing::instrument(skip(self, tx), fields(category = name))]
    pub async fn ensure_category(
        &self,
        guild: GuildId,
        name: &str,
        tx: &mut Transaction,
    ) -> Result<Provisioned<CategoryId>> {
        if let Some(id) = self
            .with_retry("find_category", || self.platform.find_category(guild, name))
            .await?
        {
            self.note_provisioned(guild, ResourceRef::Category(id), name, false)
                .await;
            return Ok(Provisioned { id, is_new: false });
        }

        let create = CategoryCreate { name: name.to_owned() };
        let id = self
            .with_retry("create_category", || {
                self.platform.create_category(guild, create.clone())
            })
            .await?;
        tx.record(RollbackEntry::DeleteResource {
            guild,
            resource: ResourceRef::Category(id),
        })
        .await?;
        self.note_provisioned(guild, ResourceRef::Category(id), name, true)
            .await;
        Ok(Provisioned { id, is_new: true })
    }

    /// Ensures a channel exists under the given parent scope.
    ///
    /// Overwrites are not applied here; they land as one `edit_overwrites`
    /// per channel in [`Provisioner::apply_overwrites`].
    #[tracing::instrument(skip(self, spec, tx), fields(channel = %spec.name))]
    pub async fn ensure_channel(
        &self,
        guild: GuildId,
        parent: Option<CategoryId>,
        spec: &blueprint::ChannelSpec,
        tx: &mut Transaction,
    ) -> Result<Provisioned<ChannelId>> {
        if let Some(id) = self
            .with_retry("find_channel", || {
                self.platform.find_channel(guild, parent, &spec.name)
            })
            .await?
        {
            self.note_provisioned(guild, ResourceRef::Channel(id), &spec.name, false)
                .await;
            return Ok(Provisioned { id, is_new: false });
        }

        let create = ChannelCreate {
            name: spec.name.clone(),
            parent,
            topic: spec.topic.clone(),
        };
        let id = self
            .with_retry("create_channel", || {
                self.platform.create_channel(guild, create.clone())
            })
            .await?;
        tx.record(RollbackEntry::DeleteResource {
            guild,
            resource: ResourceRef::Channel(id),
        })
        .await?;
        self.note_provisioned(guild, ResourceRef::Channel(id), &spec.name, true)
            .await;
        Ok(Provisioned { id, is_new: true })
    }

    /// Resolves role names and replaces the overwrite set on the target,
    /// recording the prior set for rollback.
    pub async fn apply_overwrites(
        &self,
        guild: GuildId,
        target: OverwriteTarget,
        specs: &[blueprint::OverwriteSpec],
        roles: &HashMap<String, RoleId>,
        tx: &mut Transaction,
    ) -> Result<()> {
        if specs.is_empty() {
            return Ok(());
        }

        let mut overwrites = Vec::with_capacity(specs.len());
        for spec in specs {
            let role = roles
                .get(&spec.role)
                .copied()
                .ok_or_else(|| DeployError::UnknownRole {
                    name: spec.role.clone(),
                })?;
            overwrites.push(Overwrite {
                role,
                allow: spec.allow.clone(),
                deny: spec.deny.clone(),
            });
        }

        let prior = self
            .with_retry("edit_overwrites", || {
                self.platform
                    .edit_overwrites(guild, target.clone(), overwrites.clone())
            })
            .await?;
        tx.record(RollbackEntry::RestoreOverwrites {
            guild,
            target,
            prior,
        })
        .await?;
        Ok(())
    }

    /// Applies a full blueprint: roles, then categories, then channels, then
    /// overwrite matrices. Re-running against an already-provisioned guild
    /// reuses everything and creates nothing.
    ///
    /// Returns the created/reused summary and the resolved IDs of every
    /// panel-bearing channel, keyed by panel kind.
    #[tracing::instrument(skip(self, blueprint, tx), fields(%guild))]
    pub async fn apply_blueprint(
        &self,
        guild: GuildId,
        blueprint: &blueprint::Blueprint,
        tx: &mut Transaction,
    ) -> Result<(ApplySummary, HashMap<common::PanelKind, ChannelId>)> {
        blueprint.validate()?;

        let mut summary = ApplySummary::default();
        let mut roles: HashMap<String, RoleId> = HashMap::new();
        let mut panel_channels = HashMap::new();

        for role in &blueprint.roles {
            let provisioned = self.ensure_role(guild, role, tx).await?;
            if provisioned.is_new {
                summary.roles_created += 1;
            } else {
                summary.roles_reused += 1;
            }
            roles.insert(role.name.clone(), provisioned.id);
        }

        for category in &blueprint.categories {
            let provisioned = self.ensure_category(guild, &category.name, tx).await?;
            if provisioned.is_new {
                summary.categories_created += 1;
            } else {
                summary.categories_reused += 1;
            }
            let category_id = provisioned.id;

            for channel in &category.channels {
                let provisioned = self
                    .ensure_channel(guild, Some(category_id), channel, tx)
                    .await?;
                if provisioned.is_new {
                    summary.channels_created += 1;
                } else {
                    summary.channels_reused += 1;
                }

                let merged = blueprint::merged_overwrites(&category.overwrites, &channel.overwrites);
                if !merged.is_empty() {
                    self.apply_overwrites(
                        guild,
                        OverwriteTarget::Channel(provisioned.id),
                        &merged,
                        &roles,
                        tx,
                    )
                    .await?;
                    summary.overwrite_targets += 1;
                }

                if let Some(kind) = &channel.panel {
                    panel_channels.insert(kind.clone(), provisioned.id);
                }
            }
        }

        metrics::counter!("guildsmith_provision_resources_created_total")
            .increment(summary.created() as u64);
        Ok((summary, panel_channels))
    }

    async fn note_provisioned(
        &self,
        guild: GuildId,
        resource: ResourceRef,
        name: &str,
        created: bool,
    ) {
        self.audit
            .emit(AuditEvent::ResourceProvisioned {
                guild,
                resource,
                name: name.to_owned(),
                created,
            })
            .await;
    }
}
