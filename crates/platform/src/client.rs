//! The platform capability trait.

use async_trait::async_trait;
use common::{CategoryId, ChannelId, GuildId, MessageId, RoleId};

use crate::types::{
    CategoryCreate, ChannelCreate, Message, MessageContent, Overwrite, OverwriteTarget, RoleCreate,
};
use crate::Result;

/// Everything the orchestration core needs from the chat platform.
///
/// Every call is fallible and a suspension point. Implementations must be
/// thread-safe; the same client is shared by all concurrent sessions and by
/// the background sweeper.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Creates a role in the guild.
    async fn create_role(&self, guild: GuildId, spec: RoleCreate) -> Result<RoleId>;

    /// Creates a channel category in the guild.
    async fn create_category(&self, guild: GuildId, spec: CategoryCreate) -> Result<CategoryId>;

    /// Creates a channel, optionally under a category.
    async fn create_channel(&self, guild: GuildId, spec: ChannelCreate) -> Result<ChannelId>;

    /// Deletes a role.
    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<()>;

    /// Deletes a category. Channels under it are reparented, not deleted.
    async fn delete_category(&self, guild: GuildId, category: CategoryId) -> Result<()>;

    /// Deletes a channel and the messages in it.
    async fn delete_channel(&self, guild: GuildId, channel: ChannelId) -> Result<()>;

    /// Replaces the permission overwrites on a channel or category.
    ///
    /// Returns the prior overwrite set so the caller can snapshot it for
    /// rollback before the change takes effect.
    async fn edit_overwrites(
        &self,
        guild: GuildId,
        target: OverwriteTarget,
        overwrites: Vec<Overwrite>,
    ) -> Result<Vec<Overwrite>>;

    /// Sends a message into a channel, returning its ID.
    async fn send_message(&self, channel: ChannelId, content: MessageContent) -> Result<MessageId>;

    /// Replaces the content of an existing message.
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: MessageContent,
    ) -> Result<()>;

    /// Deletes a message.
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<()>;

    /// Fetches a message back from the platform.
    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> Result<Message>;

    /// Looks up a role by name within the guild.
    async fn find_role(&self, guild: GuildId, name: &str) -> Result<Option<RoleId>>;

    /// Looks up a category by name within the guild.
    ///
    /// Fails with `Conflict` if the name belongs to a plain channel instead.
    async fn find_category(&self, guild: GuildId, name: &str) -> Result<Option<CategoryId>>;

    /// Looks up a channel by name within the given parent scope.
    ///
    /// Fails with `Conflict` if the name belongs to a category instead.
    async fn find_channel(
        &self,
        guild: GuildId,
        parent: Option<CategoryId>,
        name: &str,
    ) -> Result<Option<ChannelId>>;

    /// Returns true if the channel still exists.
    async fn channel_exists(&self, guild: GuildId, channel: ChannelId) -> Result<bool>;
}
