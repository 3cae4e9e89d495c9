//! Wizard session endpoints: the four verbs over HTTP.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use common::{AdminId, ChannelId, GuildId, PanelKind};
use deploy::{ConfirmOutcome, SessionManager, SessionView};
use platform::PlatformClient;
use store::{PanelStore, SessionStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<P, S> {
    pub manager: Arc<SessionManager<P, S>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartRequest {
    pub admin: Uuid,
    pub goals: Vec<String>,
}

#[derive(Deserialize)]
pub struct TargetRequest {
    pub actor: Uuid,
    pub channel: Uuid,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub actor: Uuid,
}

// -- Handlers --

/// POST /guilds/{guild}/sessions — start a wizard for the given admin.
#[tracing::instrument(skip(state, req))]
pub async fn start<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path(guild): Path<Uuid>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let goals = req.goals.iter().map(|g| PanelKind::new(g)).collect();
    let view = state
        .manager
        .start(GuildId::from(guild), AdminId::from(req.admin), goals)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /guilds/{guild}/sessions/{admin} — current session snapshot.
pub async fn view<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path((guild, admin)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionView>, ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let view = state
        .manager
        .view(GuildId::from(guild), AdminId::from(admin))
        .await?;
    Ok(Json(view))
}

/// POST /guilds/{guild}/sessions/{admin}/target — pick the destination
/// channel for the goal at the cursor.
#[tracing::instrument(skip(state, req))]
pub async fn select_target<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path((guild, admin)): Path<(Uuid, Uuid)>,
    Json(req): Json<TargetRequest>,
) -> Result<Json<SessionView>, ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let view = state
        .manager
        .select_target(
            GuildId::from(guild),
            AdminId::from(admin),
            AdminId::from(req.actor),
            ChannelId::from(req.channel),
        )
        .await?;
    Ok(Json(view))
}

/// POST /guilds/{guild}/sessions/{admin}/confirm — run the deploy step.
#[tracing::instrument(skip(state, req))]
pub async fn confirm<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path((guild, admin)): Path<(Uuid, Uuid)>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<ConfirmOutcome>, ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let outcome = state
        .manager
        .confirm(
            GuildId::from(guild),
            AdminId::from(admin),
            AdminId::from(req.actor),
        )
        .await?;
    Ok(Json(outcome))
}

/// DELETE /guilds/{guild}/sessions/{admin} — cancel the wizard.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path((guild, admin)): Path<(Uuid, Uuid)>,
    Json(req): Json<ActorRequest>,
) -> Result<StatusCode, ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    state
        .manager
        .cancel(
            GuildId::from(guild),
            AdminId::from(admin),
            AdminId::from(req.actor),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
