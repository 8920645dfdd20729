//! Centralized configuration (environment variables + defaults).

use crate::app::RateLimitConfig;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `development`, `staging` or `production`. Reported by the healthcheck.
    pub env: String,
    /// When unset the server runs on in-process stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_query_timeout: Duration,
    pub limiter: RateLimitConfig,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy: bool,
    pub cors_trusted_origins: Vec<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            env: "development".to_string(),
            database_url: None,
            db_max_connections: 25,
            db_query_timeout: Duration::from_secs(3),
            limiter: RateLimitConfig::default(),
            trust_proxy: false,
            cors_trusted_origins: Vec::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let env = Env(&lookup);

        let limiter = RateLimitConfig {
            enabled: env.parse_bool("LIMITER_ENABLED", defaults.limiter.enabled)?,
            requests_per_second: env.parse("LIMITER_RPS", defaults.limiter.requests_per_second)?,
            burst: env.parse("LIMITER_BURST", defaults.limiter.burst)?,
            idle_timeout: env.secs("LIMITER_IDLE_SECS", defaults.limiter.idle_timeout)?,
            sweep_interval: env.secs("LIMITER_SWEEP_SECS", defaults.limiter.sweep_interval)?,
        };
        if !(limiter.requests_per_second > 0.0 && limiter.requests_per_second.is_finite()) {
            return Err(invalid(
                "LIMITER_RPS",
                limiter.requests_per_second.to_string(),
                "must be a positive number",
            ));
        }
        if limiter.burst == 0 {
            return Err(invalid("LIMITER_BURST", "0", "must be at least 1"));
        }

        let log_format = match env.get("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "expected json or pretty")),
        };

        Ok(Self {
            port: env.parse("PORT", defaults.port)?,
            env: env.get("ENV").unwrap_or(defaults.env),
            database_url: env.get("DATABASE_URL"),
            db_max_connections: env.parse("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_query_timeout: env.secs("DB_QUERY_TIMEOUT_SECS", defaults.db_query_timeout)?,
            limiter,
            trust_proxy: env.parse_bool("TRUST_PROXY", defaults.trust_proxy)?,
            cors_trusted_origins: env
                .get("CORS_TRUSTED_ORIGINS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            log_format,
        })
    }
}

fn invalid(name: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.into(),
        reason: reason.into(),
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| invalid(name, raw.clone(), e.to_string())),
        }
    }

    fn parse_bool(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(other) => Err(invalid(name, other, "expected true or false")),
        }
    }

    fn secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse(name, default.as_secs())?;
        if secs == 0 {
            return Err(invalid(name, "0", "must be at least 1 second"));
        }
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.env, "development");
        assert!(config.database_url.is_none());
        assert_eq!(config.db_max_connections, 25);
        assert_eq!(config.db_query_timeout, Duration::from_secs(3));
        assert_eq!(config.limiter, RateLimitConfig::default());
        assert!(!config.trust_proxy);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn values_are_read() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("ENV", "production"),
            ("DATABASE_URL", "postgres://localhost/animes"),
            ("LIMITER_ENABLED", "false"),
            ("LIMITER_RPS", "0.5"),
            ("LIMITER_BURST", "10"),
            ("TRUST_PROXY", "1"),
            ("CORS_TRUSTED_ORIGINS", "http://a.test  http://b.test"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.env, "production");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/animes"));
        assert!(!config.limiter.enabled);
        assert_eq!(config.limiter.requests_per_second, 0.5);
        assert_eq!(config.limiter.burst, 10);
        assert!(config.trust_proxy);
        assert_eq!(config.cors_trusted_origins, ["http://a.test", "http://b.test"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().starts_with("PORT has an invalid value \"eighty\""));

        let err = config_from(&[("LIMITER_ENABLED", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("LIMITER_ENABLED"));

        let err = config_from(&[("LIMITER_RPS", "-1")]).unwrap_err();
        assert!(err.to_string().contains("LIMITER_RPS"));

        let err = config_from(&[("DB_QUERY_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("DB_QUERY_TIMEOUT_SECS"));

        let err = config_from(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(err.to_string().contains("LOG_FORMAT"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", "  "), ("DATABASE_URL", "")]).unwrap();
        assert_eq!(config.port, 4000);
        assert!(config.database_url.is_none());
    }
}
