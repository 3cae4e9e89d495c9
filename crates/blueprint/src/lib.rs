//! Declarative guild blueprints.
//!
//! A blueprint is an immutable, externally supplied description of the
//! resource tree to provision: roles with permission sets, categories with
//! permission-overwrite defaults, channels with overrides and optional panel
//! bindings. Blueprints are read-only and shared by all sessions; the
//! provisioner interprets them, this crate only models and validates them.

pub mod error;
pub mod merge;
pub mod model;

pub use error::BlueprintError;
pub use merge::merged_overwrites;
pub use model::{Blueprint, CategorySpec, ChannelSpec, OverwriteSpec, RoleSpec};
