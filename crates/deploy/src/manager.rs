//! The session manager: the four wizard verbs over a registry of live
//! sessions, each serialized behind its own advisory lock.
//!
//! Lock order is registry read → session mutex; the registry write lock is
//! only taken while no task can be waiting on the session mutex holder, so
//! the two cannot deadlock. Every session mutation is persisted before the
//! verb returns.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use common::{AdminId, ChannelId, GuildId, MessageId, PanelKind};
use platform::PlatformClient;
use serde::Serialize;
use store::{PanelStore, SessionRow, SessionStore, StoreError};

use crate::audit::{AuditEvent, AuditSink, CloseReason};
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::panels::{BuilderRegistry, PanelDeployer};
use crate::provisioner::{retry_platform, ApplySummary, Provisioner};
use crate::rollback::{RollbackCoordinator, RollbackEntry, StackJournal, Transaction};
use crate::session::{Session, SessionKey, SessionState};
use crate::validate::{ValidationPolicy, Validator};

/// Read-only snapshot of a session, as surfaced to the driving layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub guild: GuildId,
    pub admin: AdminId,
    pub state: SessionState,
    pub cursor: usize,
    pub goals: Vec<PanelKind>,
    pub completed: Vec<PanelKind>,
    pub current_goal: Option<PanelKind>,
    pub target: Option<ChannelId>,
    /// True when an interactive step has sat idle past the short timeout.
    /// The session is still alive; the sweeper's TTL is the hard limit.
    pub stale: bool,
}

impl SessionView {
    fn of(session: &Session, config: &DeployConfig) -> Self {
        let interactive = matches!(
            session.state,
            SessionState::AwaitingTarget | SessionState::Confirming
        );
        let idle = Utc::now() - session.last_activity_at
            > chrono::Duration::from_std(config.interactive_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        Self {
            guild: session.key.guild,
            admin: session.key.admin,
            state: session.state,
            cursor: session.cursor,
            goals: session.goals.clone(),
            completed: session.completed.clone(),
            current_goal: session.current_goal().cloned(),
            target: session.target,
            stale: interactive && idle,
        }
    }
}

/// What a successful `confirm` deployed.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub kind: PanelKind,
    pub channel: ChannelId,
    pub message: MessageId,
    /// Set when validation failed under the warn policy.
    pub validation_warning: Option<String>,
    pub session: SessionView,
}

/// Journals a transaction's rollback stack into the session row, so a crash
/// mid-deploy leaves a replayable stack in the store.
struct SessionJournal<S> {
    store: Arc<S>,
    row: Mutex<SessionRow>,
}

#[async_trait::async_trait]
impl<S: SessionStore + 'static> StackJournal for SessionJournal<S> {
    async fn stack_changed(&self, entries: &[RollbackEntry]) -> Result<()> {
        let mut row = self.row.lock().await;
        row.rollback_stack = serde_json::to_value(entries).map_err(StoreError::from)?;
        row.last_activity_at = Utc::now();
        self.store.upsert_session(&row).await?;
        Ok(())
    }
}

/// Drives wizard sessions through their state machine.
pub struct SessionManager<P, S> {
    platform: Arc<P>,
    store: Arc<S>,
    registry: Arc<BuilderRegistry>,
    provisioner: Provisioner<P>,
    deployer: PanelDeployer<P, S>,
    coordinator: RollbackCoordinator<P, S>,
    validator: Validator<P>,
    config: DeployConfig,
    audit: Arc<dyn AuditSink>,
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<Session>>>>,
}

impl<P, S> SessionManager<P, S>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    pub fn new(
        platform: Arc<P>,
        store: Arc<S>,
        registry: Arc<BuilderRegistry>,
        config: DeployConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(platform.clone(), config.retry.clone(), audit.clone()),
            deployer: PanelDeployer::new(
                platform.clone(),
                store.clone(),
                registry.clone(),
                config.retry.clone(),
                audit.clone(),
            ),
            coordinator: RollbackCoordinator::new(platform.clone(), store.clone(), audit.clone()),
            validator: Validator::new(platform.clone(), audit.clone()),
            platform,
            store,
            registry,
            config,
            audit,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Number of sessions currently live in the registry.
    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Panel kinds with a registered content builder.
    pub fn panel_kinds(&self) -> Vec<PanelKind> {
        self.registry.kinds()
    }

    /// Starts a wizard for `(guild, admin)` with the given goal list.
    #[tracing::instrument(skip(self, goals), fields(%guild, %admin))]
    pub async fn start(
        &self,
        guild: GuildId,
        admin: AdminId,
        goals: Vec<PanelKind>,
    ) -> Result<SessionView> {
        if goals.is_empty() {
            return Err(DeployError::NoGoals);
        }
        for goal in &goals {
            // Reject unknown kinds up front rather than at the deploy step.
            self.registry.get(goal)?;
        }

        let key = SessionKey::new(guild, admin);
        let now = Utc::now();
        let mut session = Session::new(key, goals, now);
        session.begin_targeting(now)?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(DeployError::SessionAlreadyActive { guild, admin });
        }
        self.store.upsert_session(&session.to_row()).await?;
        let view = SessionView::of(&session, &self.config);
        sessions.insert(key, Arc::new(Mutex::new(session)));
        metrics::counter!("guildsmith_sessions_started_total").increment(1);
        Ok(view)
    }

    /// Selects the destination channel for the goal at the cursor.
    #[tracing::instrument(skip(self), fields(%guild, %actor, %channel))]
    pub async fn select_target(
        &self,
        guild: GuildId,
        admin: AdminId,
        actor: AdminId,
        channel: ChannelId,
    ) -> Result<SessionView> {
        let handle = self.owned_session(guild, admin, actor).await?;
        let mut session = handle.lock().await;
        self.ensure_open(&session)?;

        let exists = retry_platform(&self.config.retry, "channel_exists", || {
            self.platform.channel_exists(guild, channel)
        })
        .await?;
        if !exists {
            return Err(DeployError::TargetMissing { guild, channel });
        }

        session.select_target(channel, Utc::now())?;
        self.store.upsert_session(&session.to_row()).await?;
        Ok(SessionView::of(&session, &self.config))
    }

    /// Confirms the pending deploy (or retries it after a failure): runs the
    /// panel deployer inside one rollback transaction, validates, and
    /// advances the cursor on success.
    #[tracing::instrument(skip(self), fields(%guild, %actor))]
    pub async fn confirm(
        &self,
        guild: GuildId,
        admin: AdminId,
        actor: AdminId,
    ) -> Result<ConfirmOutcome> {
        let handle = self.owned_session(guild, admin, actor).await?;
        let mut session = handle.lock().await;
        self.ensure_open(&session)?;

        let now = Utc::now();
        let target = session.begin_deploy(now)?;
        let goal = session
            .current_goal()
            .cloned()
            .ok_or_else(|| DeployError::CorruptSession {
                reason: "deploying past the last goal".to_owned(),
            })?;
        self.store.upsert_session(&session.to_row()).await?;

        let journal = Arc::new(SessionJournal {
            store: self.store.clone(),
            row: Mutex::new(session.to_row()),
        });
        let mut tx = Transaction::with_journal(format!("deploy {goal} into {target}"), journal);

        let started = std::time::Instant::now();
        let step = self.deploy_step(guild, target, &goal, actor, &mut tx).await;
        metrics::histogram!("guildsmith_deploy_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match step {
            Ok((message, warning)) => {
                tx.discard();
                session.mark_success(Utc::now())?;
                let view = SessionView::of(&session, &self.config);
                if session.state.is_terminal() {
                    self.close(&mut session, CloseReason::Completed).await?;
                } else {
                    self.store.upsert_session(&session.to_row()).await?;
                }
                Ok(ConfirmOutcome {
                    kind: goal,
                    channel: target,
                    message,
                    validation_warning: warning,
                    session: view,
                })
            }
            Err(err) => {
                tracing::warn!(%guild, goal = %goal, error = %err, "deploy step failed, rolling back");
                self.coordinator.unwind(&mut tx).await;
                session.mark_failure(Utc::now())?;
                // Empty-stack row overwrites whatever the journal last wrote.
                // A store outage here must not mask the deploy error itself;
                // restore() reconciles the stale row later.
                if let Err(persist_err) = self.store.upsert_session(&session.to_row()).await {
                    tracing::error!(%guild, error = %persist_err, "failed to persist failed session");
                }
                Err(err)
            }
        }
    }

    async fn deploy_step(
        &self,
        guild: GuildId,
        channel: ChannelId,
        goal: &PanelKind,
        actor: AdminId,
        tx: &mut Transaction,
    ) -> Result<(MessageId, Option<String>)> {
        let row = self.deployer.deploy(guild, channel, goal, actor, tx).await?;

        let expected = self.registry.get(goal)?.expected_components();
        match self.validator.validate(&row, &expected).await {
            Ok(()) => Ok((row.message, None)),
            Err(err) => match self.config.validation {
                ValidationPolicy::Warn => {
                    tracing::warn!(%guild, kind = %goal, error = %err, "panel failed validation, keeping deployment");
                    Ok((row.message, Some(err.to_string())))
                }
                ValidationPolicy::Rollback => Err(err.into()),
            },
        }
    }

    /// Cancels the session: replays any residual rollback stack the store
    /// still holds, then deletes the session.
    #[tracing::instrument(skip(self), fields(%guild, %actor))]
    pub async fn cancel(&self, guild: GuildId, admin: AdminId, actor: AdminId) -> Result<()> {
        let handle = self.owned_session(guild, admin, actor).await?;
        let mut session = handle.lock().await;
        self.ensure_open(&session)?;

        if let Some(row) = self.store.get_session(guild, admin).await? {
            let residual: Vec<RollbackEntry> =
                serde_json::from_value(row.rollback_stack).unwrap_or_default();
            if !residual.is_empty() {
                self.coordinator
                    .unwind_entries(&format!("cancel {}", session.key), residual)
                    .await;
            }
        }
        self.close(&mut session, CloseReason::Cancelled).await
    }

    /// Snapshot of the session for the driving layer.
    pub async fn view(&self, guild: GuildId, admin: AdminId) -> Result<SessionView> {
        let handle = self.session_handle(guild, admin).await?;
        let session = handle.lock().await;
        self.ensure_open(&session)?;
        Ok(SessionView::of(&session, &self.config))
    }

    /// Repopulates the registry from the store on startup.
    ///
    /// Rows idle past the TTL are left for the sweeper. A row caught
    /// mid-deploy (state `Deploying`, possibly with a journaled stack) has
    /// its residual stack replayed and comes back as `Failed` so the admin
    /// can retry. Returns the number of sessions restored.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.config.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let now = Utc::now();
        let mut restored = 0usize;

        for row in self.store.get_active_sessions().await? {
            if row.is_idle(ttl, now) {
                continue;
            }
            let (mut session, residual) = match Session::from_row(&row) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(guild = %row.guild, admin = %row.admin, error = %err, "skipping unreadable session row");
                    continue;
                }
            };
            if session.state.is_terminal() {
                self.store.delete_session(row.guild, row.admin).await?;
                continue;
            }

            if !residual.is_empty() {
                self.coordinator
                    .unwind_entries(&format!("restore {}", session.key), residual)
                    .await;
            }
            if session.state == SessionState::Deploying {
                session.state = SessionState::Failed;
            }
            session.touch(now);
            self.store.upsert_session(&session.to_row()).await?;

            let key = session.key;
            self.sessions
                .write()
                .await
                .insert(key, Arc::new(Mutex::new(session)));
            restored += 1;
        }

        tracing::info!(restored, "session registry restored");
        Ok(restored)
    }

    /// Applies a full blueprint to the guild inside one rollback transaction.
    ///
    /// Returns the created/reused summary plus the resolved channel for each
    /// panel-bearing channel in the blueprint, for starting wizards against.
    #[tracing::instrument(skip(self, blueprint), fields(%guild))]
    pub async fn apply_blueprint(
        &self,
        guild: GuildId,
        blueprint: &blueprint::Blueprint,
    ) -> Result<(ApplySummary, HashMap<PanelKind, ChannelId>)> {
        let mut tx = Transaction::new(format!("blueprint for {guild}"));
        match self.provisioner.apply_blueprint(guild, blueprint, &mut tx).await {
            Ok(outcome) => {
                tx.discard();
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(%guild, error = %err, "blueprint apply failed, rolling back");
                self.coordinator.unwind(&mut tx).await;
                Err(err)
            }
        }
    }

    /// Drops a session from the registry without touching the store. The
    /// sweeper calls this after expiring a row.
    pub(crate) async fn evict(&self, key: SessionKey) {
        // Drop the registry guard before waiting on the session mutex; a
        // holder of that mutex may itself be about to take the registry lock.
        let handle = self.sessions.write().await.remove(&key);
        if let Some(handle) = handle {
            handle.lock().await.closed = true;
        }
    }

    pub(crate) fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn coordinator(&self) -> &RollbackCoordinator<P, S> {
        &self.coordinator
    }

    pub(crate) fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    async fn close(&self, session: &mut Session, reason: CloseReason) -> Result<()> {
        let key = session.key;
        self.store.delete_session(key.guild, key.admin).await?;
        session.closed = true;
        self.sessions.write().await.remove(&key);
        self.audit
            .emit(AuditEvent::SessionClosed {
                guild: key.guild,
                admin: key.admin,
                reason,
            })
            .await;
        Ok(())
    }

    async fn session_handle(&self, guild: GuildId, admin: AdminId) -> Result<Arc<Mutex<Session>>> {
        let key = SessionKey::new(guild, admin);
        self.sessions
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(DeployError::SessionNotFound { guild, admin })
    }

    async fn owned_session(
        &self,
        guild: GuildId,
        admin: AdminId,
        actor: AdminId,
    ) -> Result<Arc<Mutex<Session>>> {
        if actor != admin {
            return Err(DeployError::NotSessionOwner { actor });
        }
        self.session_handle(guild, admin).await
    }

    fn ensure_open(&self, session: &Session) -> Result<()> {
        if session.closed {
            return Err(DeployError::SessionNotFound {
                guild: session.key.guild,
                admin: session.key.admin,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::panels::{PanelContent, PanelContentBuilder, StaticPanelBuilder};
    use crate::rollback::RollbackEntry;
    use platform::{ChannelCreate, Component, InMemoryPlatform, MessageContent};
    use std::time::Duration;
    use store::InMemoryStore;

    fn registry() -> Arc<BuilderRegistry> {
        let catalog = MessageContent::text("Browse the catalog")
            .with_component(Component::button("catalog:open", "Open"));
        let support = MessageContent::text("Open a ticket")
            .with_component(Component::button("support:new", "New ticket"));
        Arc::new(
            BuilderRegistry::new()
                .with(
                    PanelKind::new("catalog"),
                    Arc::new(StaticPanelBuilder::new("Catalog", catalog)),
                )
                .with(
                    PanelKind::new("support"),
                    Arc::new(StaticPanelBuilder::new("Support", support)),
                ),
        )
    }

    fn config() -> DeployConfig {
        DeployConfig {
            retry: crate::config::RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
            },
            ..DeployConfig::default()
        }
    }

    struct Harness {
        platform: Arc<InMemoryPlatform>,
        store: Arc<InMemoryStore>,
        audit: Arc<InMemoryAuditSink>,
        manager: SessionManager<InMemoryPlatform, InMemoryStore>,
    }

    fn harness() -> Harness {
        let platform = Arc::new(InMemoryPlatform::new());
        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let manager = SessionManager::new(
            platform.clone(),
            store.clone(),
            registry(),
            config(),
            audit.clone(),
        );
        Harness {
            platform,
            store,
            audit,
            manager,
        }
    }

    /// Renders a plain message but promises a component it never attaches,
    /// so validation always fails after a successful deploy.
    struct BrokenCatalogBuilder;

    #[async_trait::async_trait]
    impl PanelContentBuilder for BrokenCatalogBuilder {
        async fn build(&self, _guild: GuildId) -> Result<PanelContent> {
            Ok(PanelContent {
                title: "Catalog".into(),
                message: MessageContent::text("Browse the catalog"),
            })
        }

        fn expected_components(&self) -> Vec<String> {
            vec!["catalog:open".into()]
        }
    }

    fn broken_catalog_harness(validation: ValidationPolicy) -> Harness {
        let platform = Arc::new(InMemoryPlatform::new());
        let store = Arc::new(InMemoryStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let registry = Arc::new(
            BuilderRegistry::new().with(PanelKind::new("catalog"), Arc::new(BrokenCatalogBuilder)),
        );
        let manager = SessionManager::new(
            platform.clone(),
            store.clone(),
            registry,
            DeployConfig {
                validation,
                ..config()
            },
            audit.clone(),
        );
        Harness {
            platform,
            store,
            audit,
            manager,
        }
    }

    async fn make_channel(platform: &InMemoryPlatform, guild: GuildId, name: &str) -> ChannelId {
        platform
            .create_channel(
                guild,
                ChannelCreate {
                    name: name.into(),
                    parent: None,
                    topic: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_wizard_completes_and_deletes_session() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();
        let catalog = make_channel(&h.platform, guild, "catalog").await;
        let support = make_channel(&h.platform, guild, "support").await;

        let view = h
            .manager
            .start(
                guild,
                admin,
                vec![PanelKind::new("catalog"), PanelKind::new("support")],
            )
            .await
            .unwrap();
        assert_eq!(view.state, SessionState::AwaitingTarget);

        h.manager
            .select_target(guild, admin, admin, catalog)
            .await
            .unwrap();
        let outcome = h.manager.confirm(guild, admin, admin).await.unwrap();
        assert_eq!(outcome.session.state, SessionState::AwaitingTarget);
        assert_eq!(outcome.session.cursor, 1);
        assert!(outcome.validation_warning.is_none());

        h.manager
            .select_target(guild, admin, admin, support)
            .await
            .unwrap();
        let outcome = h.manager.confirm(guild, admin, admin).await.unwrap();
        assert_eq!(outcome.session.state, SessionState::Completed);

        // Terminal completion removes the session entirely.
        assert!(matches!(
            h.manager.view(guild, admin).await,
            Err(DeployError::SessionNotFound { .. })
        ));
        assert_eq!(h.store.session_count().await, 0);
        assert_eq!(h.platform.message_count(guild), 2);
        assert_eq!(
            h.audit.count_where(|e| matches!(
                e,
                AuditEvent::SessionClosed {
                    reason: CloseReason::Completed,
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test]
    async fn failed_deploy_rolls_back_and_allows_retry() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        h.manager
            .select_target(guild, admin, admin, channel)
            .await
            .unwrap();

        // Panel record upsert fails after the message was sent; the rollback
        // must delete the just-sent message.
        h.store.set_fail_on_upsert_panel(true).await;
        let err = h.manager.confirm(guild, admin, admin).await.unwrap_err();
        assert!(matches!(err, DeployError::Persistence(_)));
        assert_eq!(h.platform.message_count(guild), 0);

        let view = h.manager.view(guild, admin).await.unwrap();
        assert_eq!(view.state, SessionState::Failed);
        assert_eq!(view.cursor, 0);

        // Retry the same goal without re-selecting the target.
        h.store.set_fail_on_upsert_panel(false).await;
        let outcome = h.manager.confirm(guild, admin, admin).await.unwrap();
        assert_eq!(outcome.session.state, SessionState::Completed);
        assert_eq!(h.platform.message_count(guild), 1);
    }

    #[tokio::test]
    async fn rollback_policy_unwinds_a_deploy_that_fails_validation() {
        let h = broken_catalog_harness(ValidationPolicy::Rollback);
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        h.manager
            .select_target(guild, admin, admin, channel)
            .await
            .unwrap();

        let err = h.manager.confirm(guild, admin, admin).await.unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        // The message and record the deploy produced are both gone again.
        assert_eq!(h.platform.message_count(guild), 0);
        assert_eq!(h.store.panel_count().await, 0);

        let view = h.manager.view(guild, admin).await.unwrap();
        assert_eq!(view.state, SessionState::Failed);
        assert_eq!(view.cursor, 0);
    }

    #[tokio::test]
    async fn warn_policy_keeps_a_deploy_that_fails_validation() {
        let h = broken_catalog_harness(ValidationPolicy::Warn);
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        h.manager
            .select_target(guild, admin, admin, channel)
            .await
            .unwrap();

        let outcome = h.manager.confirm(guild, admin, admin).await.unwrap();
        assert!(outcome.validation_warning.is_some());
        assert_eq!(outcome.session.state, SessionState::Completed);
        assert_eq!(h.platform.message_count(guild), 1);
        assert_eq!(h.store.panel_count().await, 1);
    }

    #[tokio::test]
    async fn deploy_error_is_not_masked_by_a_store_outage() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        h.manager
            .select_target(guild, admin, admin, channel)
            .await
            .unwrap();

        // The deploy fails for permissions and the store goes down right
        // after the row was marked deploying; the admin must still see the
        // deploy error, not the row-write failure.
        h.platform.deny("send_message", "send_messages");
        h.store.fail_session_upserts_after(1).await;
        let err = h.manager.confirm(guild, admin, admin).await.unwrap_err();
        assert!(matches!(err, DeployError::Permission { .. }));
    }

    #[tokio::test]
    async fn only_the_owner_may_drive() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();

        let intruder = AdminId::new();
        assert!(matches!(
            h.manager
                .select_target(guild, admin, intruder, channel)
                .await,
            Err(DeployError::NotSessionOwner { .. })
        ));
        assert!(matches!(
            h.manager.cancel(guild, admin, intruder).await,
            Err(DeployError::NotSessionOwner { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        assert!(matches!(
            h.manager
                .start(guild, admin, vec![PanelKind::new("support")])
                .await,
            Err(DeployError::SessionAlreadyActive { .. })
        ));
    }

    #[tokio::test]
    async fn start_rejects_empty_and_unknown_goals() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();

        assert!(matches!(
            h.manager.start(guild, admin, vec![]).await,
            Err(DeployError::NoGoals)
        ));
        assert!(matches!(
            h.manager
                .start(guild, admin, vec![PanelKind::new("tickets")])
                .await,
            Err(DeployError::UnknownPanelKind(_))
        ));
    }

    #[tokio::test]
    async fn select_target_requires_live_channel() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        assert!(matches!(
            h.manager
                .select_target(guild, admin, admin, ChannelId::new())
                .await,
            Err(DeployError::TargetMissing { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_deletes_session_and_audits() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();

        h.manager
            .start(guild, admin, vec![PanelKind::new("catalog")])
            .await
            .unwrap();
        h.manager.cancel(guild, admin, admin).await.unwrap();

        assert_eq!(h.store.session_count().await, 0);
        assert!(matches!(
            h.manager.view(guild, admin).await,
            Err(DeployError::SessionNotFound { .. })
        ));
        assert_eq!(
            h.audit.count_where(|e| matches!(
                e,
                AuditEvent::SessionClosed {
                    reason: CloseReason::Cancelled,
                    ..
                }
            )),
            1
        );
    }

    #[tokio::test]
    async fn restore_replays_residual_stack_and_marks_failed() {
        let h = harness();
        let guild = GuildId::new();
        let admin = AdminId::new();
        let channel = make_channel(&h.platform, guild, "catalog").await;

        // Simulate a crash mid-deploy: a Deploying row with a journaled stack
        // pointing at a message that did get sent.
        let message = h
            .platform
            .send_message(channel, MessageContent::text("orphan"))
            .await
            .unwrap();
        let key = SessionKey::new(guild, admin);
        let mut session = Session::new(key, vec![PanelKind::new("catalog")], Utc::now());
        session.begin_targeting(Utc::now()).unwrap();
        session.select_target(channel, Utc::now()).unwrap();
        session.begin_deploy(Utc::now()).unwrap();
        let mut row = session.to_row();
        row.rollback_stack =
            serde_json::to_value(vec![RollbackEntry::DeleteMessage { channel, message }]).unwrap();
        h.store.upsert_session(&row).await.unwrap();

        let restored = h.manager.restore().await.unwrap();
        assert_eq!(restored, 1);
        // The orphaned message was rolled back.
        assert_eq!(h.platform.message_count(guild), 0);

        let view = h.manager.view(guild, admin).await.unwrap();
        assert_eq!(view.state, SessionState::Failed);
        assert_eq!(view.cursor, 0);

        // And the stored row no longer carries a stack.
        let stored = h.store.get_session(guild, admin).await.unwrap().unwrap();
        let residual: Vec<RollbackEntry> =
            serde_json::from_value(stored.rollback_stack).unwrap();
        assert!(residual.is_empty());
    }

    #[tokio::test]
    async fn apply_blueprint_twice_is_idempotent() {
        let h = harness();
        let guild = GuildId::new();
        let bp = blueprint::Blueprint::from_toml_str(
            r#"
            [[roles]]
            name = "staff"

            [[categories]]
            name = "shop"

            [[categories.channels]]
            name = "catalog"
            panel = "catalog"
            "#,
        )
        .unwrap();

        let (first, panels) = h.manager.apply_blueprint(guild, &bp).await.unwrap();
        assert_eq!(first.created(), 3);
        assert_eq!(panels.len(), 1);

        let (second, _) = h.manager.apply_blueprint(guild, &bp).await.unwrap();
        assert_eq!(second.created(), 0);
        assert_eq!(h.platform.channel_count(guild), 1);
    }

    #[tokio::test]
    async fn failed_blueprint_apply_rolls_back_created_resources() {
        let h = harness();
        let guild = GuildId::new();
        let bp = blueprint::Blueprint::from_toml_str(
            r#"
            [[roles]]
            name = "staff"

            [[categories]]
            name = "shop"

            [[categories.channels]]
            name = "catalog"
            "#,
        )
        .unwrap();

        h.platform.deny("create_channel", "manage_channels");
        let err = h.manager.apply_blueprint(guild, &bp).await.unwrap_err();
        assert!(matches!(err, DeployError::Permission { .. }));

        // The role and category created before the failure are gone again.
        assert_eq!(h.platform.role_count(guild), 0);
        assert_eq!(h.platform.category_count(guild), 0);
    }
}
