//! Tracing subscriber setup.

use chronicle_core::{ChronicleResult, ConfigError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FORMAT_ENV: &str = "CHRONICLE_LOG_FORMAT";
const DEFAULT_FILTER: &str = "chronicle=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl TelemetryConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup(LOG_FORMAT_ENV) {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };
        Self {
            format,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable. Fails if a subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> ChronicleResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing".to_string(),
        value: format!("{:?}", config.format),
        reason: e.to_string(),
    })?;

    tracing::debug!(format = ?config.format, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_format_from_env() {
        let config = TelemetryConfig::from_lookup(|key| {
            (key == LOG_FORMAT_ENV).then(|| " JSON ".to_string())
        });
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_filter, "chronicle=info");
    }

    #[test]
    fn test_plain_is_default() {
        assert_eq!(TelemetryConfig::from_lookup(|_| None).format, LogFormat::Plain);
        let other = TelemetryConfig::from_lookup(|_| Some("pretty".to_string()));
        assert_eq!(other.format, LogFormat::Plain);
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::from_lookup(|_| None);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
