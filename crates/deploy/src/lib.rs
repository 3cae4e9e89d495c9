//! Provisioning and deployment orchestration.
//!
//! The pieces, leaves first:
//!
//! 1. [`provisioner::Provisioner`] — idempotent create-or-reuse of single
//!    platform resources from a blueprint.
//! 2. [`rollback::RollbackCoordinator`] — records a compensating action for
//!    every effectful step and replays them in reverse on failure. The
//!    platform has no multi-resource transactions; this simulates one.
//! 3. [`panels::PanelDeployer`] — sends or updates one panel message and its
//!    persisted record inside a single transaction.
//! 4. [`validate::Validator`] — re-fetches a just-deployed panel and checks
//!    it against expectations.
//! 5. [`manager::SessionManager`] — the resumable multi-step wizard state
//!    machine driving deployments, persisted after every mutation.
//! 6. [`sweeper::Sweeper`] — background expiry of idle sessions and
//!    reclamation of orphaned panel records.

pub mod audit;
pub mod config;
pub mod error;
pub mod manager;
pub mod panels;
pub mod provisioner;
pub mod rollback;
pub mod session;
pub mod sweeper;
pub mod validate;

pub use audit::{AuditEvent, AuditSink, CloseReason, InMemoryAuditSink, TracingAuditSink};
pub use config::{DeployConfig, RetryPolicy};
pub use error::DeployError;
pub use manager::{ConfirmOutcome, SessionManager, SessionView};
pub use panels::{
    BuilderRegistry, PanelContent, PanelContentBuilder, PanelDeployer, StaticPanelBuilder,
};
pub use provisioner::{ApplySummary, Provisioned, Provisioner};
pub use rollback::{RollbackCoordinator, RollbackEntry, StackJournal, Transaction};
pub use session::{Session, SessionKey, SessionState};
pub use sweeper::{SweepReport, Sweeper};
pub use validate::{ValidationError, ValidationPolicy, Validator};
