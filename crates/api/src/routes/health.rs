//! Health endpoint: liveness plus a snapshot of the orchestration state.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use platform::PlatformClient;
use store::{PanelStore, SessionStore};

use crate::routes::sessions::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Wizard sessions currently live in this process.
    pub active_sessions: usize,
    /// Panel kinds a wizard can deploy.
    pub panel_kinds: Vec<String>,
}

/// GET /health
pub async fn check<P, S>(State(state): State<Arc<AppState<P, S>>>) -> Json<HealthResponse>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let mut panel_kinds: Vec<String> = state
        .manager
        .panel_kinds()
        .iter()
        .map(|k| k.to_string())
        .collect();
    panel_kinds.sort();

    Json(HealthResponse {
        status: "ok",
        active_sessions: state.manager.active_session_count().await,
        panel_kinds,
    })
}
