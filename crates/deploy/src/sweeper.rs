//! Background expiry and orphan reclamation.
//!
//! Runs on a fixed interval: sessions idle past the TTL are expired (any
//! rollback stack they still hold is replayed first, exactly once, because
//! the row is deleted in the same pass), and panel records whose channel or
//! message no longer exists are reclaimed so redeploys do not see stale
//! "already deployed" rows.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use platform::PlatformClient;
use store::{PanelStore, SessionStore};

use crate::audit::{AuditEvent, CloseReason};
use crate::error::Result;
use crate::manager::SessionManager;
use crate::rollback::RollbackEntry;
use crate::session::SessionKey;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions_expired: usize,
    pub stacks_replayed: usize,
    pub panels_reclaimed: usize,
}

/// The background cleanup loop.
pub struct Sweeper<P, S> {
    manager: Arc<SessionManager<P, S>>,
}

impl<P, S> Sweeper<P, S>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    pub fn new(manager: Arc<SessionManager<P, S>>) -> Self {
        Self { manager }
    }

    /// Runs forever at the configured interval. Spawn this on its own task;
    /// aborting the task stops the sweeper.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.manager.config().sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.sweep_once().await {
                Ok(report) => {
                    if report != SweepReport::default() {
                        tracing::info!(
                            sessions_expired = report.sessions_expired,
                            stacks_replayed = report.stacks_replayed,
                            panels_reclaimed = report.panels_reclaimed,
                            "sweep pass finished"
                        );
                    }
                }
                Err(err) => tracing::error!(error = %err, "sweep pass failed"),
            }
        }
    }

    /// One full pass over sessions and panel records.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        self.expire_sessions(&mut report).await?;
        self.reclaim_orphans(&mut report).await?;
        Ok(report)
    }

    async fn expire_sessions(&self, report: &mut SweepReport) -> Result<()> {
        let ttl = chrono::Duration::from_std(self.manager.config().session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let now = Utc::now();

        for row in self.manager.store().get_active_sessions().await? {
            if !row.is_idle(ttl, now) {
                continue;
            }
            let key = SessionKey::new(row.guild, row.admin);

            let residual: Vec<RollbackEntry> =
                serde_json::from_value(row.rollback_stack.clone()).unwrap_or_default();
            if !residual.is_empty() {
                self.manager
                    .coordinator()
                    .unwind_entries(&format!("expire {key}"), residual)
                    .await;
                report.stacks_replayed += 1;
            }

            // Deleting the row in the same pass makes the replay exactly-once.
            self.manager.store().delete_session(row.guild, row.admin).await?;
            self.manager.evict(key).await;
            self.manager
                .audit()
                .emit(AuditEvent::SessionClosed {
                    guild: row.guild,
                    admin: row.admin,
                    reason: CloseReason::Expired,
                })
                .await;
            metrics::counter!("guildsmith_sweeper_sessions_expired_total").increment(1);
            report.sessions_expired += 1;
        }
        Ok(())
    }

    async fn reclaim_orphans(&self, report: &mut SweepReport) -> Result<()> {
        for guild in self.manager.store().list_guilds().await? {
            for row in self.manager.store().list_panels(guild).await? {
                let orphaned = match self.is_orphaned(&row).await {
                    Ok(orphaned) => orphaned,
                    Err(err) => {
                        // Transient platform trouble: leave the row for the
                        // next pass rather than reclaiming on bad evidence.
                        tracing::warn!(panel = %row.id, error = %err, "skipping orphan check");
                        continue;
                    }
                };
                if !orphaned {
                    continue;
                }

                self.manager.store().delete_panel(row.id).await?;
                self.manager
                    .audit()
                    .emit(AuditEvent::OrphanReclaimed {
                        guild,
                        channel: row.channel,
                        kind: row.kind.clone(),
                    })
                    .await;
                metrics::counter!("guildsmith_sweeper_panels_reclaimed_total").increment(1);
                report.panels_reclaimed += 1;
            }
        }
        Ok(())
    }

    async fn is_orphaned(&self, row: &store::PanelRow) -> Result<bool> {
        let platform = self.manager.platform();
        if !platform.channel_exists(row.guild, row.channel).await? {
            return Ok(true);
        }
        match platform.fetch_message(row.channel, row.message).await {
            Ok(_) => Ok(false),
            Err(err) if err.is_not_found() => Ok(true),
            Err(err) => Err(err.into()),
        }
    }
}
