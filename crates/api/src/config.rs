//! Server configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `GUILDSMITH_SWEEP` — set to `false` to disable the background sweeper
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub sweep_enabled: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            sweep_enabled: std::env::var("GUILDSMITH_SWEEP")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            sweep_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.sweep_enabled);
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "debug".to_string(),
            sweep_enabled: false,
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
