//! Shared identifier types for the guildsmith workspace.
//!
//! Every external resource is referenced through a stable opaque ID rather
//! than a live platform handle, so sessions can be persisted and resumed
//! without holding onto connection-scoped objects.

pub mod ids;
pub mod panel_kind;

pub use ids::{AdminId, CategoryId, ChannelId, GuildId, MessageId, PanelId, RoleId};
pub use panel_kind::PanelKind;
