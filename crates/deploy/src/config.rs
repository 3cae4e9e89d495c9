//! Orchestration configuration loaded from environment variables.

use std::time::Duration;

use crate::validate::ValidationPolicy;

/// Retry policy for transient platform errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff to sleep after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
        }
    }
}

/// Tunables for the orchestration core.
///
/// Reads from environment variables:
/// - `GUILDSMITH_INTERACTIVE_TIMEOUT_SECS` — UI step staleness (default: 300)
/// - `GUILDSMITH_SESSION_TTL_SECS` — sweeper expiry backstop (default: 1800)
/// - `GUILDSMITH_SWEEP_INTERVAL_SECS` — sweep cadence (default: 300)
/// - `GUILDSMITH_RETRY_MAX_ATTEMPTS` — transient retry budget (default: 3)
/// - `GUILDSMITH_RETRY_BASE_BACKOFF_MS` — first backoff (default: 200)
/// - `GUILDSMITH_VALIDATION_POLICY` — `warn` or `rollback` (default: warn)
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub interactive_timeout: Duration,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub retry: RetryPolicy,
    pub validation: ValidationPolicy,
}

impl DeployConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interactive_timeout: Duration::from_secs(env_u64(
                "GUILDSMITH_INTERACTIVE_TIMEOUT_SECS",
                defaults.interactive_timeout.as_secs(),
            )),
            session_ttl: Duration::from_secs(env_u64(
                "GUILDSMITH_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_u64(
                "GUILDSMITH_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            retry: RetryPolicy {
                max_attempts: env_u64(
                    "GUILDSMITH_RETRY_MAX_ATTEMPTS",
                    u64::from(defaults.retry.max_attempts),
                ) as u32,
                base_backoff: Duration::from_millis(env_u64(
                    "GUILDSMITH_RETRY_BASE_BACKOFF_MS",
                    defaults.retry.base_backoff.as_millis() as u64,
                )),
            },
            validation: std::env::var("GUILDSMITH_VALIDATION_POLICY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.validation),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            interactive_timeout: Duration::from_secs(300),
            session_ttl: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            validation: ValidationPolicy::Warn,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
