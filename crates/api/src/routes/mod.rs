//! HTTP route handlers.

pub mod blueprints;
pub mod health;
pub mod metrics;
pub mod sessions;
