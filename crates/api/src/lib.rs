//! HTTP driver for the guild provisioning wizard.
//!
//! Exposes the four session verbs plus blueprint apply, with structured
//! logging (tracing) and Prometheus metrics. The UI layer proper lives
//! elsewhere; this is the external-driver seam over the deploy crate.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use deploy::{AuditSink, BuilderRegistry, DeployConfig, SessionManager, TracingAuditSink};
use platform::{InMemoryPlatform, PlatformClient};
use store::{InMemoryStore, PanelStore, SessionStore};

use routes::sessions::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<P, S>(state: Arc<AppState<P, S>>, metrics_handle: PrometheusHandle) -> Router
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<P, S>))
        .route("/guilds/{guild}/blueprint", post(routes::blueprints::apply::<P, S>))
        .route("/guilds/{guild}/sessions", post(routes::sessions::start::<P, S>))
        .route(
            "/guilds/{guild}/sessions/{admin}",
            get(routes::sessions::view::<P, S>),
        )
        .route(
            "/guilds/{guild}/sessions/{admin}",
            delete(routes::sessions::cancel::<P, S>),
        )
        .route(
            "/guilds/{guild}/sessions/{admin}/target",
            post(routes::sessions::select_target::<P, S>),
        )
        .route(
            "/guilds/{guild}/sessions/{admin}/confirm",
            post(routes::sessions::confirm::<P, S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over the in-memory platform and store, with the
/// given panel builder registry. Production deployments swap the store and
/// platform behind the same state shape.
pub fn create_default_state(
    registry: Arc<BuilderRegistry>,
) -> Arc<AppState<InMemoryPlatform, InMemoryStore>> {
    let platform = Arc::new(InMemoryPlatform::new());
    let store = Arc::new(InMemoryStore::new());
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let manager = Arc::new(SessionManager::new(
        platform,
        store,
        registry,
        DeployConfig::from_env(),
        audit,
    ));
    Arc::new(AppState { manager })
}
