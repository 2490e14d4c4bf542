use std::str::FromStr;
use std::time::Duration;

use folio_pipeline::config::{MonitorConfig, OrchestratorConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// PostgreSQL URL. Without it the server runs on in-memory stores.
    pub database_url: Option<String>,
    /// Base URL of the external worker.
    pub worker_url: String,
    /// Timeout of a dispatch request in seconds (default: `30`).
    pub worker_timeout_secs: u64,
    pub orchestrator: OrchestratorConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                        |
    /// |--------------------------------|--------------------------------|
    /// | `HOST`                         | `0.0.0.0`                      |
    /// | `PORT`                         | `3000`                         |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173`        |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                           |
    /// | `DATABASE_URL`                 | unset (in-memory stores)       |
    /// | `WORKER_URL`                   | `http://localhost:8700`        |
    /// | `WORKER_TIMEOUT_SECS`          | `30`                           |
    /// | `CALLBACK_BASE_URL`            | `http://localhost:3000/api/v1` |
    /// | `JOB_STALE_AFTER_SECS`         | `900`                          |
    /// | `JOB_POLL_INTERVAL_MS`         | `2000`                         |
    /// | `JOB_MAX_POLL_ATTEMPTS`        | `30`                           |
    /// | `JOB_RESUBSCRIBE_MAX_ATTEMPTS` | `5`                            |
    /// | `STEP_ADVANCE_DELAY_MS`        | `2000`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = OrchestratorConfig::default();

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "PORT", 3000u16)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let worker_url = lookup("WORKER_URL").unwrap_or_else(|| "http://localhost:8700".into());
        let worker_timeout_secs = parse_or(&lookup, "WORKER_TIMEOUT_SECS", 30u64)?;

        let monitor = MonitorConfig {
            stale_after: Duration::from_secs(parse_or(
                &lookup,
                "JOB_STALE_AFTER_SECS",
                defaults.monitor.stale_after.as_secs(),
            )?),
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "JOB_POLL_INTERVAL_MS",
                defaults.monitor.poll_interval.as_millis() as u64,
            )?),
            max_poll_attempts: parse_or(
                &lookup,
                "JOB_MAX_POLL_ATTEMPTS",
                defaults.monitor.max_poll_attempts,
            )?,
            resubscribe: folio_worker::backoff::BackoffConfig {
                max_attempts: parse_or(
                    &lookup,
                    "JOB_RESUBSCRIBE_MAX_ATTEMPTS",
                    defaults.monitor.resubscribe.max_attempts,
                )?,
                ..defaults.monitor.resubscribe.clone()
            },
        };

        let orchestrator = OrchestratorConfig {
            monitor,
            advance_delay: Duration::from_millis(parse_or(
                &lookup,
                "STEP_ADVANCE_DELAY_MS",
                defaults.advance_delay.as_millis() as u64,
            )?),
            callback_base_url: lookup("CALLBACK_BASE_URL")
                .unwrap_or_else(|| defaults.callback_base_url.clone()),
            ..defaults
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            worker_url,
            worker_timeout_secs,
            orchestrator,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, None);
        assert_eq!(config.worker_url, "http://localhost:8700");
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
    }

    #[test]
    fn job_settings_are_read() {
        let config = from_pairs(&[
            ("JOB_STALE_AFTER_SECS", "60"),
            ("JOB_POLL_INTERVAL_MS", "500"),
            ("JOB_RESUBSCRIBE_MAX_ATTEMPTS", "2"),
            ("STEP_ADVANCE_DELAY_MS", "0"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
        ])
        .unwrap();

        assert_eq!(config.orchestrator.monitor.stale_after, Duration::from_secs(60));
        assert_eq!(
            config.orchestrator.monitor.poll_interval,
            Duration::from_millis(500)
        );
        assert_eq!(config.orchestrator.monitor.resubscribe.max_attempts, 2);
        assert_eq!(config.orchestrator.advance_delay, Duration::ZERO);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_number_is_rejected() {
        assert_matches!(
            from_pairs(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        );
    }
}
