//! API server entry point.

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use common::PanelKind;
use deploy::{BuilderRegistry, StaticPanelBuilder, Sweeper};
use platform::{Component, MessageContent};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Built-in panels. Business features register richer builders here.
fn builtin_registry() -> Arc<BuilderRegistry> {
    Arc::new(
        BuilderRegistry::new()
            .with(
                PanelKind::new("welcome"),
                Arc::new(StaticPanelBuilder::new(
                    "Welcome",
                    MessageContent::text("Welcome to the guild.")
                        .with_component(Component::button("welcome:rules", "Read the rules")),
                )),
            )
            .with(
                PanelKind::new("support"),
                Arc::new(StaticPanelBuilder::new(
                    "Support",
                    MessageContent::text("Need help? Open a ticket.")
                        .with_component(Component::button("support:new", "New ticket")),
                )),
            ),
    )
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = api::config::Config::from_env();

    // 3. Wire the orchestration core
    let state = api::create_default_state(builtin_registry());

    // 4. Restore interrupted wizards from the store
    let restored = state
        .manager
        .restore()
        .await
        .expect("session restore failed");
    tracing::info!(restored, "sessions restored from store");

    // 5. Spawn the background sweeper
    if config.sweep_enabled {
        let sweeper = Sweeper::new(state.manager.clone());
        tokio::spawn(async move { sweeper.run().await });
    }

    // 6. Build and start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
