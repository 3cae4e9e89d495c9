//! Blueprint apply endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{ChannelId, GuildId, PanelKind};
use deploy::ApplySummary;
use platform::PlatformClient;
use store::{PanelStore, SessionStore};

use crate::error::ApiError;
use crate::routes::sessions::AppState;

#[derive(Deserialize)]
pub struct ApplyRequest {
    /// The blueprint as TOML text.
    pub toml: String,
}

#[derive(Serialize)]
pub struct ApplyResponse {
    pub summary: ApplySummary,
    /// Resolved channel per panel-bearing channel in the blueprint.
    pub panel_channels: HashMap<PanelKind, ChannelId>,
}

/// POST /guilds/{guild}/blueprint — apply a full blueprint to the guild.
#[tracing::instrument(skip(state, req))]
pub async fn apply<P, S>(
    State(state): State<Arc<AppState<P, S>>>,
    Path(guild): Path<Uuid>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, ApiError>
where
    P: PlatformClient + 'static,
    S: SessionStore + PanelStore + 'static,
{
    let parsed = blueprint::Blueprint::from_toml_str(&req.toml)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let (summary, panel_channels) = state
        .manager
        .apply_blueprint(GuildId::from(guild), &parsed)
        .await?;
    Ok(Json(ApplyResponse {
        summary,
        panel_channels,
    }))
}
