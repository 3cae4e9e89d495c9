//! Audit events.
//!
//! Every provisioning decision, rollback execution, and validation failure
//! is emitted as a structured event. The transport (audit channel, log
//! shipper) lives outside this crate; sinks here either trace or collect.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{AdminId, ChannelId, GuildId, MessageId, PanelKind};
use platform::ResourceRef;
use serde::Serialize;

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Completed,
    Cancelled,
    Expired,
}

/// A structured audit record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The provisioner created or reused a resource.
    ResourceProvisioned {
        guild: GuildId,
        resource: ResourceRef,
        name: String,
        created: bool,
    },

    /// A panel message was sent or updated and its record written.
    PanelDeployed {
        guild: GuildId,
        channel: ChannelId,
        kind: PanelKind,
        message: MessageId,
        replaced: bool,
    },

    /// One rollback entry was replayed (or failed to replay).
    RollbackExecuted {
        transaction: String,
        entry: String,
        ok: bool,
    },

    /// A deployed panel failed validation.
    ValidationFailed {
        guild: GuildId,
        channel: ChannelId,
        kind: PanelKind,
        reason: String,
    },

    /// A session reached the end of its life.
    SessionClosed {
        guild: GuildId,
        admin: AdminId,
        reason: CloseReason,
    },

    /// The sweeper reclaimed a panel record whose artifact is gone.
    OrphanReclaimed {
        guild: GuildId,
        channel: ChannelId,
        kind: PanelKind,
    },
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Emits one event. Must not fail; sinks swallow their own errors.
    async fn emit(&self, event: AuditEvent);
}

/// Sink that writes events to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{event:?}"));
        tracing::info!(target: "audit", %payload, "audit event");
    }
}

/// Sink that collects events in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events emitted so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }

    /// Counts events matching a predicate.
    pub fn count_where(&self, predicate: impl Fn(&AuditEvent) -> bool) -> usize {
        self.events.read().unwrap().iter().filter(|e| predicate(e)).count()
    }

    /// Counts provisioning events with the given `created` flag.
    pub fn provisioned(&self, created: bool) -> usize {
        self.count_where(|e| matches!(e, AuditEvent::ResourceProvisioned { created: c, .. } if *c == created))
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn emit(&self, event: AuditEvent) {
        self.events.write().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_collects_in_order() {
        let sink = InMemoryAuditSink::new();
        let guild = GuildId::new();
        let admin = AdminId::new();

        sink.emit(AuditEvent::SessionClosed {
            guild,
            admin,
            reason: CloseReason::Completed,
        })
        .await;
        sink.emit(AuditEvent::SessionClosed {
            guild,
            admin,
            reason: CloseReason::Expired,
        })
        .await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            AuditEvent::SessionClosed {
                reason: CloseReason::Completed,
                ..
            }
        ));
        assert_eq!(
            sink.count_where(|e| matches!(e, AuditEvent::SessionClosed { .. })),
            2
        );
    }

    #[test]
    fn events_serialize_tagged() {
        let event = AuditEvent::OrphanReclaimed {
            guild: GuildId::new(),
            channel: ChannelId::new(),
            kind: PanelKind::new("catalog"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "orphan_reclaimed");
        assert_eq!(json["data"]["kind"], "catalog");
    }
}
