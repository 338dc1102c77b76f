//! Service configuration read from the environment.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::policy::check_match_ratio;
use crate::DEFAULT_MATCH_RATIO;

/// Default object storage endpoint.
pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Log output format for the service binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable output for local runs.
    Pretty,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Base URL tables are fetched below.
    pub storage_base_url: String,
    /// Per-request timeout for table downloads.
    pub fetch_timeout: Duration,
    /// Table byte cache settings.
    pub cache: CacheConfig,
    /// Ratio applied when a request omits `match_ratio`.
    pub default_match_ratio: f64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4001,
            storage_base_url: DEFAULT_STORAGE_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(30),
            cache: CacheConfig::default(),
            default_match_ratio: DEFAULT_MATCH_RATIO,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from process environment variables.
    ///
    /// Unset variables take their defaults. Set-but-invalid ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse_var(&lookup, "PORT")?.unwrap_or(defaults.port);
        let storage_base_url = lookup("STORAGE_BASE_URL").unwrap_or(defaults.storage_base_url);
        let fetch_timeout = parse_var::<u64, _>(&lookup, "FETCH_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);

        let cache = CacheConfig {
            max_entries: parse_var(&lookup, "CACHE_MAX_ENTRIES")?
                .unwrap_or(defaults.cache.max_entries),
            enabled: parse_bool(&lookup, "CACHE_ENABLED")?.unwrap_or(defaults.cache.enabled),
            compress: parse_bool(&lookup, "CACHE_COMPRESS")?.unwrap_or(defaults.cache.compress),
        };

        let default_match_ratio =
            parse_var(&lookup, "DEFAULT_MATCH_RATIO")?.unwrap_or(defaults.default_match_ratio);
        check_match_ratio(default_match_ratio).map_err(|e| ConfigError::Invalid {
            var: "DEFAULT_MATCH_RATIO",
            value: default_match_ratio.to_string(),
            reason: e.to_string(),
        })?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") => defaults.log_format,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: v.to_string(),
                    reason: "expected \"json\" or \"pretty\"".to_string(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            storage_base_url,
            fetch_timeout,
            cache,
            default_match_ratio,
            log_format,
        })
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).map(|raw| (raw.trim().to_ascii_lowercase(), raw)) {
        None => Ok(None),
        Some((v, _)) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
        Some((v, _)) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
        Some((_, raw)) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}
