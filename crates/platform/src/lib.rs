//! Chat platform client abstraction.
//!
//! Defines the capability surface the orchestration core needs from the
//! external platform (`PlatformClient`), the typed error model that lets
//! callers distinguish permission failures from transient ones, and an
//! in-memory fake guild for tests.

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

pub use client::PlatformClient;
pub use error::{PlatformError, Result};
pub use memory::InMemoryPlatform;
pub use types::{
    CategoryCreate, ChannelCreate, Component, ComponentKind, Message, MessageContent, Overwrite,
    OverwriteTarget, Permission, ResourceKind, ResourceRef, RoleCreate,
};
