//! In-memory platform fake for tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CategoryId, ChannelId, GuildId, MessageId, RoleId};

use crate::client::PlatformClient;
use crate::error::{PlatformError, Result};
use crate::types::{
    CategoryCreate, ChannelCreate, Message, MessageContent, Overwrite, OverwriteTarget,
    ResourceKind, RoleCreate,
};

#[derive(Debug, Clone)]
struct RoleRecord {
    name: String,
    #[allow(dead_code)]
    spec: RoleCreate,
}

#[derive(Debug, Clone, Default)]
struct CategoryRecord {
    name: String,
    overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone)]
struct ChannelRecord {
    name: String,
    parent: Option<CategoryId>,
    #[allow(dead_code)]
    topic: Option<String>,
    overwrites: Vec<Overwrite>,
}

#[derive(Debug, Default)]
struct GuildState {
    roles: HashMap<RoleId, RoleRecord>,
    categories: HashMap<CategoryId, CategoryRecord>,
    channels: HashMap<ChannelId, ChannelRecord>,
    messages: HashMap<MessageId, Message>,
}

#[derive(Debug, Default)]
struct PlatformState {
    guilds: HashMap<GuildId, GuildState>,
    /// Actions that fail with a permission error: action name -> missing permission.
    denied: HashMap<&'static str, String>,
    /// Actions that fail transiently for the next N calls.
    transient: HashMap<&'static str, u32>,
}

/// An in-memory fake guild implementing the full platform surface.
///
/// Supports fail injection per action: `deny(action, permission)` makes the
/// action fail with a permission error, `fail_transiently(action, n)` makes
/// the next `n` calls fail with a transient error and then succeed. Both are
/// useful for exercising rollback and retry paths without a real platform.
#[derive(Clone, Default)]
pub struct InMemoryPlatform {
    state: Arc<RwLock<PlatformState>>,
}

impl InMemoryPlatform {
    /// Creates an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `action` fail with a permission error naming `missing`.
    pub fn deny(&self, action: &'static str, missing: impl Into<String>) {
        self.state.write().unwrap().denied.insert(action, missing.into());
    }

    /// Clears a previously injected denial.
    pub fn allow(&self, action: &'static str) {
        self.state.write().unwrap().denied.remove(action);
    }

    /// Makes the next `times` calls to `action` fail transiently.
    pub fn fail_transiently(&self, action: &'static str, times: u32) {
        self.state.write().unwrap().transient.insert(action, times);
    }

    /// Number of roles in the guild.
    pub fn role_count(&self, guild: GuildId) -> usize {
        self.with_guild(guild, |g| g.roles.len())
    }

    /// Number of categories in the guild.
    pub fn category_count(&self, guild: GuildId) -> usize {
        self.with_guild(guild, |g| g.categories.len())
    }

    /// Number of channels in the guild.
    pub fn channel_count(&self, guild: GuildId) -> usize {
        self.with_guild(guild, |g| g.channels.len())
    }

    /// Number of messages across all channels in the guild.
    pub fn message_count(&self, guild: GuildId) -> usize {
        self.with_guild(guild, |g| g.messages.len())
    }

    /// Returns the overwrites currently set on a channel.
    pub fn channel_overwrites(&self, guild: GuildId, channel: ChannelId) -> Vec<Overwrite> {
        self.with_guild(guild, |g| {
            g.channels
                .get(&channel)
                .map(|c| c.overwrites.clone())
                .unwrap_or_default()
        })
    }

    /// Removes a channel out-of-band, simulating external deletion.
    pub fn remove_channel(&self, guild: GuildId, channel: ChannelId) {
        let mut state = self.state.write().unwrap();
        if let Some(g) = state.guilds.get_mut(&guild) {
            g.channels.remove(&channel);
            g.messages.retain(|_, m| m.channel != channel);
        }
    }

    /// Removes a message out-of-band, simulating external deletion.
    pub fn remove_message(&self, guild: GuildId, message: MessageId) {
        let mut state = self.state.write().unwrap();
        if let Some(g) = state.guilds.get_mut(&guild) {
            g.messages.remove(&message);
        }
    }

    fn with_guild<T>(&self, guild: GuildId, f: impl FnOnce(&GuildState) -> T) -> T {
        let state = self.state.read().unwrap();
        match state.guilds.get(&guild) {
            Some(g) => f(g),
            None => f(&GuildState::default()),
        }
    }

    /// Checks fail injection for an action. Must be called with the write lock held.
    fn check_injection(state: &mut PlatformState, action: &'static str) -> Result<()> {
        if let Some(missing) = state.denied.get(action) {
            return Err(PlatformError::permission(action, missing.clone()));
        }
        if let Some(remaining) = state.transient.get_mut(action) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PlatformError::transient(format!("{action} rate limited")));
            }
        }
        Ok(())
    }

    fn find_guild_of_channel(state: &PlatformState, channel: ChannelId) -> Option<GuildId> {
        state
            .guilds
            .iter()
            .find(|(_, g)| g.channels.contains_key(&channel))
            .map(|(id, _)| *id)
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn create_role(&self, guild: GuildId, spec: RoleCreate) -> Result<RoleId> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "create_role")?;
        let id = RoleId::new();
        state.guilds.entry(guild).or_default().roles.insert(
            id,
            RoleRecord {
                name: spec.name.clone(),
                spec,
            },
        );
        Ok(id)
    }

    async fn create_category(&self, guild: GuildId, spec: CategoryCreate) -> Result<CategoryId> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "create_category")?;
        let id = CategoryId::new();
        state.guilds.entry(guild).or_default().categories.insert(
            id,
            CategoryRecord {
                name: spec.name,
                overwrites: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_channel(&self, guild: GuildId, spec: ChannelCreate) -> Result<ChannelId> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "create_channel")?;
        let g = state.guilds.entry(guild).or_default();
        if let Some(parent) = spec.parent {
            if !g.categories.contains_key(&parent) {
                return Err(PlatformError::not_found(format!("category {parent}")));
            }
        }
        let id = ChannelId::new();
        g.channels.insert(
            id,
            ChannelRecord {
                name: spec.name,
                parent: spec.parent,
                topic: spec.topic,
                overwrites: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "delete_role")?;
        let g = state
            .guilds
            .get_mut(&guild)
            .ok_or_else(|| PlatformError::not_found(format!("guild {guild}")))?;
        g.roles
            .remove(&role)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(format!("role {role}")))
    }

    async fn delete_category(&self, guild: GuildId, category: CategoryId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "delete_category")?;
        let g = state
            .guilds
            .get_mut(&guild)
            .ok_or_else(|| PlatformError::not_found(format!("guild {guild}")))?;
        if g.categories.remove(&category).is_none() {
            return Err(PlatformError::not_found(format!("category {category}")));
        }
        for channel in g.channels.values_mut() {
            if channel.parent == Some(category) {
                channel.parent = None;
            }
        }
        Ok(())
    }

    async fn delete_channel(&self, guild: GuildId, channel: ChannelId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "delete_channel")?;
        let g = state
            .guilds
            .get_mut(&guild)
            .ok_or_else(|| PlatformError::not_found(format!("guild {guild}")))?;
        if g.channels.remove(&channel).is_none() {
            return Err(PlatformError::not_found(format!("channel {channel}")));
        }
        g.messages.retain(|_, m| m.channel != channel);
        Ok(())
    }

    async fn edit_overwrites(
        &self,
        guild: GuildId,
        target: OverwriteTarget,
        overwrites: Vec<Overwrite>,
    ) -> Result<Vec<Overwrite>> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "edit_overwrites")?;
        let g = state
            .guilds
            .get_mut(&guild)
            .ok_or_else(|| PlatformError::not_found(format!("guild {guild}")))?;
        let slot = match target {
            OverwriteTarget::Category(id) => g
                .categories
                .get_mut(&id)
                .map(|c| &mut c.overwrites)
                .ok_or_else(|| PlatformError::not_found(format!("category {id}")))?,
            OverwriteTarget::Channel(id) => g
                .channels
                .get_mut(&id)
                .map(|c| &mut c.overwrites)
                .ok_or_else(|| PlatformError::not_found(format!("channel {id}")))?,
        };
        Ok(std::mem::replace(slot, overwrites))
    }

    async fn send_message(&self, channel: ChannelId, content: MessageContent) -> Result<MessageId> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "send_message")?;
        let guild = Self::find_guild_of_channel(&state, channel)
            .ok_or_else(|| PlatformError::not_found(format!("channel {channel}")))?;
        let id = MessageId::new();
        let message = Message {
            id,
            guild,
            channel,
            content,
        };
        state
            .guilds
            .get_mut(&guild)
            .expect("guild looked up above")
            .messages
            .insert(id, message);
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: MessageContent,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "edit_message")?;
        let guild = Self::find_guild_of_channel(&state, channel)
            .ok_or_else(|| PlatformError::not_found(format!("channel {channel}")))?;
        let existing = state
            .guilds
            .get_mut(&guild)
            .expect("guild looked up above")
            .messages
            .get_mut(&message)
            .filter(|m| m.channel == channel)
            .ok_or_else(|| PlatformError::not_found(format!("message {message}")))?;
        existing.content = content;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        Self::check_injection(&mut state, "delete_message")?;
        let guild = Self::find_guild_of_channel(&state, channel)
            .ok_or_else(|| PlatformError::not_found(format!("channel {channel}")))?;
        state
            .guilds
            .get_mut(&guild)
            .expect("guild looked up above")
            .messages
            .remove(&message)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(format!("message {message}")))
    }

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<Message> {
        let state = self.state.read().unwrap();
        state
            .guilds
            .values()
            .filter_map(|g| g.messages.get(&message))
            .find(|m| m.channel == channel)
            .cloned()
            .ok_or_else(|| PlatformError::not_found(format!("message {message}")))
    }

    async fn find_role(&self, guild: GuildId, name: &str) -> Result<Option<RoleId>> {
        let state = self.state.read().unwrap();
        Ok(state.guilds.get(&guild).and_then(|g| {
            g.roles
                .iter()
                .find(|(_, r)| r.name == name)
                .map(|(id, _)| *id)
        }))
    }

    async fn find_category(&self, guild: GuildId, name: &str) -> Result<Option<CategoryId>> {
        let state = self.state.read().unwrap();
        let Some(g) = state.guilds.get(&guild) else {
            return Ok(None);
        };
        if let Some((id, _)) = g.categories.iter().find(|(_, c)| c.name == name) {
            return Ok(Some(*id));
        }
        if g.channels.values().any(|c| c.name == name) {
            return Err(PlatformError::Conflict {
                name: name.to_string(),
                expected: ResourceKind::Category,
                actual: ResourceKind::Channel,
            });
        }
        Ok(None)
    }

    async fn find_channel(
        &self,
        guild: GuildId,
        parent: Option<CategoryId>,
        name: &str,
    ) -> Result<Option<ChannelId>> {
        let state = self.state.read().unwrap();
        let Some(g) = state.guilds.get(&guild) else {
            return Ok(None);
        };
        if let Some((id, _)) = g
            .channels
            .iter()
            .find(|(_, c)| c.name == name && c.parent == parent)
        {
            return Ok(Some(*id));
        }
        if g.categories.values().any(|c| c.name == name) {
            return Err(PlatformError::Conflict {
                name: name.to_string(),
                expected: ResourceKind::Channel,
                actual: ResourceKind::Category,
            });
        }
        Ok(None)
    }

    async fn channel_exists(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let state = self.state.read().unwrap();
        Ok(state
            .guilds
            .get(&guild)
            .is_some_and(|g| g.channels.contains_key(&channel)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_spec(name: &str) -> RoleCreate {
        RoleCreate {
            name: name.to_string(),
            permissions: vec![crate::types::Permission::ViewChannel],
        }
    }

    #[tokio::test]
    async fn create_and_find_roles() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();

        let id = platform.create_role(guild, role_spec("staff")).await.unwrap();
        assert_eq!(platform.find_role(guild, "staff").await.unwrap(), Some(id));
        assert_eq!(platform.find_role(guild, "nobody").await.unwrap(), None);
        assert_eq!(platform.role_count(guild), 1);
    }

    #[tokio::test]
    async fn channel_lifecycle_with_messages() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();

        let category = platform
            .create_category(guild, CategoryCreate { name: "shop".into() })
            .await
            .unwrap();
        let channel = platform
            .create_channel(
                guild,
                ChannelCreate {
                    name: "orders".into(),
                    parent: Some(category),
                    topic: None,
                },
            )
            .await
            .unwrap();

        let message = platform
            .send_message(channel, MessageContent::text("hi"))
            .await
            .unwrap();
        assert_eq!(platform.message_count(guild), 1);

        let fetched = platform.fetch_message(channel, message).await.unwrap();
        assert_eq!(fetched.content.body, "hi");
        assert_eq!(fetched.guild, guild);

        platform.delete_channel(guild, channel).await.unwrap();
        assert_eq!(platform.message_count(guild), 0);
        assert!(platform
            .fetch_message(channel, message)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn find_channel_reports_kind_conflict() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();

        platform
            .create_category(guild, CategoryCreate { name: "support".into() })
            .await
            .unwrap();

        let err = platform
            .find_channel(guild, None, "support")
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Conflict { .. }));
    }

    #[tokio::test]
    async fn deny_injects_permission_error() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();
        platform.deny("create_role", "manage_roles");

        let err = platform.create_role(guild, role_spec("staff")).await.unwrap_err();
        assert!(matches!(err, PlatformError::Permission { .. }));

        platform.allow("create_role");
        platform.create_role(guild, role_spec("staff")).await.unwrap();
    }

    #[tokio::test]
    async fn transient_failures_recover_after_n_calls() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();
        platform.fail_transiently("create_role", 2);

        assert!(platform.create_role(guild, role_spec("a")).await.unwrap_err().is_transient());
        assert!(platform.create_role(guild, role_spec("a")).await.unwrap_err().is_transient());
        platform.create_role(guild, role_spec("a")).await.unwrap();
    }

    #[tokio::test]
    async fn edit_overwrites_returns_prior_set() {
        let platform = InMemoryPlatform::new();
        let guild = GuildId::new();
        let channel = platform
            .create_channel(
                guild,
                ChannelCreate {
                    name: "general".into(),
                    parent: None,
                    topic: None,
                },
            )
            .await
            .unwrap();

        let first = vec![Overwrite {
            role: RoleId::new(),
            allow: vec![crate::types::Permission::ViewChannel],
            deny: vec![],
        }];
        let prior = platform
            .edit_overwrites(guild, OverwriteTarget::Channel(channel), first.clone())
            .await
            .unwrap();
        assert!(prior.is_empty());

        let prior = platform
            .edit_overwrites(guild, OverwriteTarget::Channel(channel), vec![])
            .await
            .unwrap();
        assert_eq!(prior, first);
        assert!(platform.channel_overwrites(guild, channel).is_empty());
    }
}
