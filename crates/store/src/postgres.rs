//! PostgreSQL-backed store implementation.

use async_trait::async_trait;
use common::{AdminId, ChannelId, GuildId, MessageId, PanelId, PanelKind};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::rows::{PanelRow, SessionRow};
use crate::traits::{PanelStore, SessionStore};

/// Durable store backed by PostgreSQL.
///
/// Upserts use single-statement `ON CONFLICT ... DO UPDATE`, so concurrent
/// writes to unrelated keys never contend and a conflicting write merges
/// fields instead of resetting the row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new Postgres store on an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_session(row: PgRow) -> Result<SessionRow> {
        Ok(SessionRow {
            guild: GuildId::from_uuid(row.try_get::<Uuid, _>("guild_id")?),
            admin: AdminId::from_uuid(row.try_get::<Uuid, _>("admin_id")?),
            goals: serde_json::from_value(row.try_get("goals")?)?,
            cursor: row.try_get::<i64, _>("cursor")? as u32,
            completed: serde_json::from_value(row.try_get("completed")?)?,
            state: row.try_get("state")?,
            target: row
                .try_get::<Option<Uuid>, _>("target_channel")?
                .map(ChannelId::from_uuid),
            rollback_stack: row.try_get("rollback_stack")?,
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
        })
    }

    fn row_to_panel(row: PgRow) -> Result<PanelRow> {
        Ok(PanelRow {
            id: PanelId::from_uuid(row.try_get::<Uuid, _>("id")?),
            kind: PanelKind::new(row.try_get::<String, _>("kind")?),
            guild: GuildId::from_uuid(row.try_get::<Uuid, _>("guild_id")?),
            channel: ChannelId::from_uuid(row.try_get::<Uuid, _>("channel_id")?),
            message: MessageId::from_uuid(row.try_get::<Uuid, _>("message_id")?),
            title: row.try_get("title")?,
            created_by: AdminId::from_uuid(row.try_get::<Uuid, _>("created_by")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn upsert_session(&self, row: &SessionRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions
                (guild_id, admin_id, goals, cursor, completed, state,
                 target_channel, rollback_stack, created_at, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (guild_id, admin_id) DO UPDATE SET
                goals = EXCLUDED.goals,
                cursor = EXCLUDED.cursor,
                completed = EXCLUDED.completed,
                state = EXCLUDED.state,
                target_channel = EXCLUDED.target_channel,
                rollback_stack = EXCLUDED.rollback_stack,
                last_activity_at = EXCLUDED.last_activity_at
            "#,
        )
        .bind(row.guild.as_uuid())
        .bind(row.admin.as_uuid())
        .bind(serde_json::to_value(&row.goals)?)
        .bind(i64::from(row.cursor))
        .bind(serde_json::to_value(&row.completed)?)
        .bind(&row.state)
        .bind(row.target.map(|t| t.as_uuid()))
        .bind(&row.rollback_stack)
        .bind(row.created_at)
        .bind(row.last_activity_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, guild: GuildId, admin: AdminId) -> Result<Option<SessionRow>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE guild_id = $1 AND admin_id = $2")
            .bind(guild.as_uuid())
            .bind(admin.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_session).transpose()
    }

    async fn get_active_sessions(&self) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_session).collect()
    }

    async fn delete_session(&self, guild: GuildId, admin: AdminId) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE guild_id = $1 AND admin_id = $2")
            .bind(guild.as_uuid())
            .bind(admin.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PanelStore for PostgresStore {
    async fn upsert_panel(&self, row: &PanelRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO panels
                (id, kind, guild_id, channel_id, message_id, title,
                 created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (guild_id, channel_id, kind) DO UPDATE SET
                message_id = EXCLUDED.message_id,
                title = EXCLUDED.title,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.kind.as_str())
        .bind(row.guild.as_uuid())
        .bind(row.channel.as_uuid())
        .bind(row.message.as_uuid())
        .bind(&row.title)
        .bind(row.created_by.as_uuid())
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_panel(
        &self,
        kind: &PanelKind,
        channel: ChannelId,
        guild: GuildId,
    ) -> Result<Option<PanelRow>> {
        let row = sqlx::query(
            "SELECT * FROM panels WHERE kind = $1 AND channel_id = $2 AND guild_id = $3",
        )
        .bind(kind.as_str())
        .bind(channel.as_uuid())
        .bind(guild.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_panel).transpose()
    }

    async fn delete_panel(&self, id: PanelId) -> Result<()> {
        sqlx::query("DELETE FROM panels WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_panels(&self, guild: GuildId) -> Result<Vec<PanelRow>> {
        let rows = sqlx::query("SELECT * FROM panels WHERE guild_id = $1 ORDER BY created_at")
            .bind(guild.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_panel).collect()
    }

    async fn list_guilds(&self) -> Result<Vec<GuildId>> {
        let rows = sqlx::query_scalar::<_, Uuid>("SELECT DISTINCT guild_id FROM panels")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(GuildId::from_uuid).collect())
    }
}
