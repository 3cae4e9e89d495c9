//! End-to-end orchestration flow: blueprint apply, wizard walk, redeploy,
//! crash recovery, and sweep, all against the in-memory platform and store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::{AdminId, GuildId, PanelKind};
use deploy::{
    AuditEvent, BuilderRegistry, DeployConfig, DeployError, InMemoryAuditSink, RetryPolicy,
    SessionManager, SessionState, StaticPanelBuilder, Sweeper,
};
use platform::{Component, InMemoryPlatform, MessageContent};
use store::{InMemoryStore, SessionStore};

const BLUEPRINT: &str = r#"
    [[roles]]
    name = "staff"
    permissions = ["manage_messages", "view_channel"]

    [[roles]]
    name = "customer"
    permissions = ["view_channel"]

    [[categories]]
    name = "shop"

    [[categories.overwrites]]
    role = "customer"
    allow = ["view_channel"]
    deny = ["send_messages"]

    [[categories.channels]]
    name = "catalog"
    topic = "Browse the catalog"
    panel = "catalog"

    [[categories.channels]]
    name = "support"
    panel = "support"

    [[categories.channels.overwrites]]
    role = "customer"
    allow = ["view_channel", "send_messages"]
"#;

struct World {
    platform: Arc<InMemoryPlatform>,
    store: Arc<InMemoryStore>,
    audit: Arc<InMemoryAuditSink>,
    manager: Arc<SessionManager<InMemoryPlatform, InMemoryStore>>,
}

fn world() -> World {
    let platform = Arc::new(InMemoryPlatform::new());
    let store = Arc::new(InMemoryStore::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let registry = Arc::new(
        BuilderRegistry::new()
            .with(
                PanelKind::new("catalog"),
                Arc::new(StaticPanelBuilder::new(
                    "Catalog",
                    MessageContent::text("Browse the catalog")
                        .with_component(Component::button("catalog:open", "Open")),
                )),
            )
            .with(
                PanelKind::new("support"),
                Arc::new(StaticPanelBuilder::new(
                    "Support",
                    MessageContent::text("Open a ticket")
                        .with_component(Component::button("support:new", "New ticket")),
                )),
            ),
    );
    let config = DeployConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        },
        ..DeployConfig::default()
    };
    let manager = Arc::new(SessionManager::new(
        platform.clone(),
        store.clone(),
        registry,
        config,
        audit.clone(),
    ));
    World {
        platform,
        store,
        audit,
        manager,
    }
}

#[tokio::test]
async fn blueprint_then_wizard_end_to_end() {
    let w = world();
    let guild = GuildId::new();
    let admin = AdminId::new();

    // Provision the whole tree, then prove the second apply is a no-op.
    let bp = blueprint::Blueprint::from_toml_str(BLUEPRINT).unwrap();
    let (summary, panels) = w.manager.apply_blueprint(guild, &bp).await.unwrap();
    assert_eq!(summary.roles_created, 2);
    assert_eq!(summary.categories_created, 1);
    assert_eq!(summary.channels_created, 2);
    assert_eq!(panels.len(), 2);

    let (again, _) = w.manager.apply_blueprint(guild, &bp).await.unwrap();
    assert_eq!(again.created(), 0);
    assert_eq!(w.platform.channel_count(guild), 2);

    // Channel overwrites landed: the channel-level customer entry won over
    // the category default.
    let catalog = panels[&PanelKind::new("catalog")];
    let support = panels[&PanelKind::new("support")];
    let overwrites = w.platform.channel_overwrites(guild, support);
    assert_eq!(overwrites.len(), 1);
    assert_eq!(overwrites[0].allow.len(), 2);
    assert!(overwrites[0].deny.is_empty());

    // Walk the wizard across both goals.
    w.manager
        .start(
            guild,
            admin,
            vec![PanelKind::new("catalog"), PanelKind::new("support")],
        )
        .await
        .unwrap();
    w.manager
        .select_target(guild, admin, admin, catalog)
        .await
        .unwrap();
    let first = w.manager.confirm(guild, admin, admin).await.unwrap();
    assert_eq!(first.session.cursor, 1);
    assert!(first.validation_warning.is_none());

    w.manager
        .select_target(guild, admin, admin, support)
        .await
        .unwrap();
    let second = w.manager.confirm(guild, admin, admin).await.unwrap();
    assert_eq!(second.session.state, SessionState::Completed);

    assert_eq!(w.platform.message_count(guild), 2);
    assert_eq!(w.store.panel_count().await, 2);
    assert_eq!(w.store.session_count().await, 0);
}

#[tokio::test]
async fn redeploy_updates_in_place_and_failure_rolls_back() {
    let w = world();
    let guild = GuildId::new();
    let bp = blueprint::Blueprint::from_toml_str(BLUEPRINT).unwrap();
    let (_, panels) = w.manager.apply_blueprint(guild, &bp).await.unwrap();
    let catalog = panels[&PanelKind::new("catalog")];

    // First admin deploys the catalog panel.
    let admin = AdminId::new();
    w.manager
        .start(guild, admin, vec![PanelKind::new("catalog")])
        .await
        .unwrap();
    w.manager
        .select_target(guild, admin, admin, catalog)
        .await
        .unwrap();
    let first = w.manager.confirm(guild, admin, admin).await.unwrap();

    // A second admin redeploys the same panel to the same channel: the
    // message is edited in place and no second record appears.
    let other = AdminId::new();
    w.manager
        .start(guild, other, vec![PanelKind::new("catalog")])
        .await
        .unwrap();
    w.manager
        .select_target(guild, other, other, catalog)
        .await
        .unwrap();
    let second = w.manager.confirm(guild, other, other).await.unwrap();
    assert_eq!(first.message, second.message);
    assert_eq!(w.platform.message_count(guild), 1);
    assert_eq!(w.store.panel_count().await, 1);

    // Third attempt hits a persistence failure after the platform edit; the
    // rollback restores the message and the record, and the session parks in
    // Failed at the same cursor.
    let third = AdminId::new();
    w.manager
        .start(guild, third, vec![PanelKind::new("catalog")])
        .await
        .unwrap();
    w.manager
        .select_target(guild, third, third, catalog)
        .await
        .unwrap();
    w.store.set_fail_on_upsert_panel(true).await;
    let err = w.manager.confirm(guild, third, third).await.unwrap_err();
    assert!(matches!(err, DeployError::Persistence(_)));
    w.store.set_fail_on_upsert_panel(false).await;

    let view = w.manager.view(guild, third).await.unwrap();
    assert_eq!(view.state, SessionState::Failed);
    assert_eq!(view.cursor, 0);
    assert_eq!(w.platform.message_count(guild), 1);
    assert_eq!(w.store.panel_count().await, 1);

    // The retry completes cleanly.
    let outcome = w.manager.confirm(guild, third, third).await.unwrap();
    assert_eq!(outcome.session.state, SessionState::Completed);
}

#[tokio::test]
async fn restart_resumes_where_the_wizard_left_off() {
    let w = world();
    let guild = GuildId::new();
    let admin = AdminId::new();
    let bp = blueprint::Blueprint::from_toml_str(BLUEPRINT).unwrap();
    let (_, panels) = w.manager.apply_blueprint(guild, &bp).await.unwrap();
    let catalog = panels[&PanelKind::new("catalog")];
    let support = panels[&PanelKind::new("support")];

    w.manager
        .start(
            guild,
            admin,
            vec![PanelKind::new("catalog"), PanelKind::new("support")],
        )
        .await
        .unwrap();
    w.manager
        .select_target(guild, admin, admin, catalog)
        .await
        .unwrap();
    w.manager.confirm(guild, admin, admin).await.unwrap();

    // "Restart": a fresh manager over the same store and platform.
    let manager = Arc::new(SessionManager::new(
        w.platform.clone(),
        w.store.clone(),
        Arc::new(
            BuilderRegistry::new()
                .with(
                    PanelKind::new("catalog"),
                    Arc::new(StaticPanelBuilder::new(
                        "Catalog",
                        MessageContent::text("Browse the catalog")
                            .with_component(Component::button("catalog:open", "Open")),
                    )),
                )
                .with(
                    PanelKind::new("support"),
                    Arc::new(StaticPanelBuilder::new(
                        "Support",
                        MessageContent::text("Open a ticket")
                            .with_component(Component::button("support:new", "New ticket")),
                    )),
                ),
        ),
        DeployConfig::default(),
        Arc::new(InMemoryAuditSink::new()),
    ));
    assert_eq!(manager.restore().await.unwrap(), 1);

    let view = manager.view(guild, admin).await.unwrap();
    assert_eq!(view.cursor, 1);
    assert_eq!(view.completed, vec![PanelKind::new("catalog")]);
    assert_eq!(view.state, SessionState::AwaitingTarget);

    // The wizard continues to completion on the new process.
    manager
        .select_target(guild, admin, admin, support)
        .await
        .unwrap();
    let outcome = manager.confirm(guild, admin, admin).await.unwrap();
    assert_eq!(outcome.session.state, SessionState::Completed);
    assert_eq!(w.platform.message_count(guild), 2);
}

#[tokio::test]
async fn abandoned_session_is_swept_and_its_stack_replayed_once() {
    let w = world();
    let guild = GuildId::new();
    let admin = AdminId::new();
    let bp = blueprint::Blueprint::from_toml_str(BLUEPRINT).unwrap();
    let (_, panels) = w.manager.apply_blueprint(guild, &bp).await.unwrap();
    let catalog = panels[&PanelKind::new("catalog")];

    w.manager
        .start(guild, admin, vec![PanelKind::new("catalog")])
        .await
        .unwrap();
    w.manager
        .select_target(guild, admin, admin, catalog)
        .await
        .unwrap();

    // Age the row past the TTL.
    let mut row = w.store.get_session(guild, admin).await.unwrap().unwrap();
    row.last_activity_at = Utc::now() - chrono::Duration::hours(2);
    w.store.upsert_session(&row).await.unwrap();

    let sweeper = Sweeper::new(w.manager.clone());
    let report = sweeper.sweep_once().await.unwrap();
    assert_eq!(report.sessions_expired, 1);
    assert_eq!(w.store.session_count().await, 0);

    // The in-memory handle is gone too; the verbs see no session.
    assert!(matches!(
        w.manager.view(guild, admin).await,
        Err(DeployError::SessionNotFound { .. })
    ));
    assert_eq!(
        w.audit
            .count_where(|e| matches!(e, AuditEvent::SessionClosed { .. })),
        1
    );
}
