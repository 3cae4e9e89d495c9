//! Durable stores for wizard sessions and panel records.
//!
//! The durable store is the source of truth for session progress; the
//! in-memory registry in the deploy crate is a startup-populated cache on
//! top of it. Two backends share the same traits: `InMemoryStore` for tests
//! and single-process setups, `PostgresStore` for durability across
//! restarts.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod rows;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use rows::{PanelRow, SessionRow};
pub use traits::{PanelStore, SessionStore};
