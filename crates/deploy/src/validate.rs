//! Post-deploy validation.
//!
//! After a panel lands, the validator re-fetches the live message and checks
//! it against the record and the builder's component contract. What happens
//! on a mismatch is the caller's policy decision, not the validator's.

use std::sync::Arc;

use common::PanelKind;
use platform::PlatformClient;
use store::PanelRow;
use thiserror::Error;

use crate::audit::{AuditEvent, AuditSink};

/// What to do when a just-deployed panel fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Log and audit the mismatch, keep the deployment. The default.
    #[default]
    Warn,
    /// Treat the mismatch as a step failure and roll the transaction back.
    Rollback,
}

impl std::str::FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(ValidationPolicy::Warn),
            "rollback" => Ok(ValidationPolicy::Rollback),
            other => Err(format!("unknown validation policy '{other}'")),
        }
    }
}

/// Ways a deployed panel can disagree with its record or contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("panel message is gone from the platform")]
    MessageMissing,

    #[error("panel message could not be fetched: {reason}")]
    Fetch { reason: String },

    #[error("panel message lives in a different channel than its record")]
    ChannelMismatch,

    #[error("panel message has an empty body")]
    EmptyBody,

    #[error("panel message is missing component '{component}'")]
    MissingComponent { component: String },
}

/// Checks a deployed panel against its persisted record.
pub struct Validator<P> {
    platform: Arc<P>,
    audit: Arc<dyn AuditSink>,
}

impl<P: PlatformClient> Validator<P> {
    pub fn new(platform: Arc<P>, audit: Arc<dyn AuditSink>) -> Self {
        Self { platform, audit }
    }

    /// Re-fetches the panel's message and verifies record/message agreement
    /// plus the structural shape for the panel kind.
    #[tracing::instrument(skip(self, row, expected_components), fields(kind = %row.kind))]
    pub async fn validate(
        &self,
        row: &PanelRow,
        expected_components: &[String],
    ) -> Result<(), ValidationError> {
        let outcome = self.check(row, expected_components).await;
        if let Err(err) = &outcome {
            metrics::counter!("guildsmith_deploy_validation_failures_total").increment(1);
            self.audit
                .emit(AuditEvent::ValidationFailed {
                    guild: row.guild,
                    channel: row.channel,
                    kind: row.kind.clone(),
                    reason: err.to_string(),
                })
                .await;
        }
        outcome
    }

    async fn check(
        &self,
        row: &PanelRow,
        expected_components: &[String],
    ) -> Result<(), ValidationError> {
        let message = match self.platform.fetch_message(row.channel, row.message).await {
            Ok(message) => message,
            Err(err) if err.is_not_found() => return Err(ValidationError::MessageMissing),
            Err(err) => {
                return Err(ValidationError::Fetch {
                    reason: err.to_string(),
                })
            }
        };

        if message.channel != row.channel {
            return Err(ValidationError::ChannelMismatch);
        }
        if message.content.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        for component in expected_components {
            if !message.content.has_component(component) {
                return Err(ValidationError::MissingComponent {
                    component: component.clone(),
                });
            }
        }
        Ok(())
    }
}
