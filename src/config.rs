//! 環境変数からの設定読み込み

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::application::RetryPolicy;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// 未設定ならインメモリストアで起動する
    pub database_url: Option<String>,
    pub port: u16,
    pub database_max_connections: u32,
    pub retry: RetryPolicy,
    /// 0なら定期的な延滞検出を行わない
    pub overdue_sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: DEFAULT_PORT,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            retry: RetryPolicy::default(),
            overdue_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数から設定を組み立てる
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut retry = defaults.retry;
        if let Some(attempts) = parse(&lookup, "RETRY_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(invalid("RETRY_MAX_ATTEMPTS", "0", "must be at least 1"));
            }
            retry.max_attempts = attempts;
        }
        if let Some(ms) = parse(&lookup, "RETRY_INITIAL_BACKOFF_MS")? {
            retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "RETRY_MAX_BACKOFF_MS")? {
            retry.max_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "OPERATION_TIMEOUT_MS")? {
            retry.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL"),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            retry,
            overdue_sweep_interval: parse(&lookup, "OVERDUE_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.overdue_sweep_interval),
        })
    }
}

fn parse<T>(lookup: impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &raw, &e.to_string()))
        })
        .transpose()
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_use_memory_store() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/library"),
            ("PORT", "8080"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("RETRY_MAX_ATTEMPTS", "6"),
            ("RETRY_INITIAL_BACKOFF_MS", "10"),
            ("RETRY_MAX_BACKOFF_MS", "500"),
            ("OPERATION_TIMEOUT_MS", "2000"),
            ("OVERDUE_SWEEP_INTERVAL_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/library")
        );
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.retry.max_backoff, Duration::from_millis(500));
        assert_eq!(config.retry.timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.overdue_sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("DATABASE_URL", "  "), ("PORT", "")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err = config_from(&[("RETRY_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "RETRY_MAX_ATTEMPTS",
                ..
            }
        ));
    }
}
