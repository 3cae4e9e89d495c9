//! Opaque UUID-backed identifier newtypes.
//!
//! Wrapping a UUID per resource kind prevents mixing up a channel ID with a
//! message ID at compile time. All IDs serialize transparently as UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type! {
    /// Identifies a guild on the platform.
    GuildId
}

id_type! {
    /// Identifies a channel within a guild.
    ChannelId
}

id_type! {
    /// Identifies a channel category within a guild.
    CategoryId
}

id_type! {
    /// Identifies a role within a guild.
    RoleId
}

id_type! {
    /// Identifies a message within a channel.
    MessageId
}

id_type! {
    /// Identifies an admin (the human driving a wizard session).
    AdminId
}

id_type! {
    /// Identifies a persisted panel record.
    PanelId
}
