//! Platform resource and message data model.

use common::{CategoryId, ChannelId, GuildId, MessageId, RoleId};
use serde::{Deserialize, Serialize};

/// A permission the platform understands.
///
/// The set is deliberately small; the orchestrator only needs to express
/// blueprint overwrite matrices, not the platform's full permission space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewChannel,
    SendMessages,
    ReadHistory,
    ManageChannels,
    ManageMessages,
    ManageRoles,
    Administrator,
}

impl Permission {
    /// Returns the permission name as the platform spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewChannel => "view_channel",
            Permission::SendMessages => "send_messages",
            Permission::ReadHistory => "read_history",
            Permission::ManageChannels => "manage_channels",
            Permission::ManageMessages => "manage_messages",
            Permission::ManageRoles => "manage_roles",
            Permission::Administrator => "administrator",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kinds of provisionable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Role,
    Category,
    Channel,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Role => "role",
            ResourceKind::Category => "category",
            ResourceKind::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

/// A typed reference to a concrete provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResourceRef {
    Role(RoleId),
    Category(CategoryId),
    Channel(ChannelId),
}

impl ResourceRef {
    /// Returns the kind of the referenced resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Role(_) => ResourceKind::Role,
            ResourceRef::Category(_) => ResourceKind::Category,
            ResourceRef::Channel(_) => ResourceKind::Channel,
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceRef::Role(id) => write!(f, "role/{id}"),
            ResourceRef::Category(id) => write!(f, "category/{id}"),
            ResourceRef::Channel(id) => write!(f, "channel/{id}"),
        }
    }
}

/// A permission overwrite for one role on one channel or category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub role: RoleId,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

/// The resource an overwrite edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverwriteTarget {
    Category(CategoryId),
    Channel(ChannelId),
}

impl std::fmt::Display for OverwriteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverwriteTarget::Category(id) => write!(f, "category/{id}"),
            OverwriteTarget::Channel(id) => write!(f, "channel/{id}"),
        }
    }
}

/// Parameters for creating a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCreate {
    pub name: String,
    pub permissions: Vec<Permission>,
}

/// Parameters for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
}

/// Parameters for creating a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreate {
    pub name: String,
    pub parent: Option<CategoryId>,
    pub topic: Option<String>,
}

/// The kind of an interactive component attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Button,
    SelectMenu,
}

/// One interactive component on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Stable component identifier, used by validation to assert shape.
    pub id: String,
    pub label: String,
    pub kind: ComponentKind,
}

impl Component {
    /// Creates a button component.
    pub fn button(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: ComponentKind::Button,
        }
    }

    /// Creates a select-menu component.
    pub fn select_menu(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: ComponentKind::SelectMenu,
        }
    }
}

/// The displayable content of a message: body text plus components.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageContent {
    pub body: String,
    pub components: Vec<Component>,
}

impl MessageContent {
    /// Creates content with the given body and no components.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            components: Vec::new(),
        }
    }

    /// Adds a component, builder-style.
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Returns true if a component with the given ID is present.
    pub fn has_component(&self, id: &str) -> bool {
        self.components.iter().any(|c| c.id == id)
    }
}

/// A message as it exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub guild: GuildId,
    pub channel: ChannelId,
    pub content: MessageContent,
}
