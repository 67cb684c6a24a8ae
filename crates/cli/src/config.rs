//! Configuration management for the CLI
//!
//! Settings are layered: built-in defaults, the optional config file,
//! `CPU_ENTITLEMENT_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable prefix, e.g. `CPU_ENTITLEMENT_API_URL`
pub const ENV_PREFIX: &str = "CPU_ENTITLEMENT";

/// Configuration problems the user has to fix before anything is queried
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API endpoint set. Use --api-url or CPU_ENTITLEMENT_API_URL")]
    MissingApiUrl,

    #[error("No access token set. Use CPU_ENTITLEMENT_ACCESS_TOKEN or the config file")]
    MissingAccessToken,

    #[error("No {0} targeted. Use --{0} or CPU_ENTITLEMENT_{upper}", upper = .0.to_uppercase())]
    MissingTarget(&'static str),

    #[error("Cannot derive the log-cache URL from '{0}'. Set log_cache_url explicitly")]
    UnderivableLogCacheUrl(String),

    #[error("Invalid history window of {0} days. Set history_window_days to a positive number")]
    InvalidHistoryWindow(i64),
}

/// CLI settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Cloud Controller endpoint
    pub api_url: Option<String>,
    /// Log-cache endpoint, derived from `api_url` when unset
    pub log_cache_url: Option<String>,
    /// OAuth access token, with or without the `bearer` prefix
    pub access_token: Option<String>,
    pub org: Option<String>,
    pub space: Option<String>,
    pub username: Option<String>,

    #[serde(default)]
    pub skip_ssl_validation: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Length of the historical usage window
    #[serde(default = "default_history_window")]
    pub history_window_days: i64,

    /// Envelopes requested per page when resolving process instances
    #[serde(default = "default_read_limit")]
    pub read_limit: usize,

    #[serde(default = "default_read_max_pages")]
    pub read_max_pages: usize,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_history_window() -> i64 {
    31
}

fn default_read_limit() -> usize {
    entitlement_lib::fetchers::DEFAULT_READ_LIMIT
}

fn default_read_max_pages() -> usize {
    entitlement_lib::fetchers::DEFAULT_MAX_PAGES
}

/// Values given on the command line, taking precedence over every other layer
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub log_cache_url: Option<String>,
    pub org: Option<String>,
    pub space: Option<String>,
    pub skip_ssl_validation: bool,
}

impl Settings {
    /// Load settings from the config file, environment and `overrides`
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };
        Self::load_from(
            path.as_deref(),
            config::Environment::with_prefix(ENV_PREFIX),
            overrides,
        )
    }

    /// Load settings with an explicit environment source
    pub fn load_from(
        config_file: Option<&Path>,
        env: config::Environment,
        overrides: &Overrides,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let mut builder = builder
            .add_source(env)
            .set_override_option("api_url", overrides.api_url.clone())?
            .set_override_option("log_cache_url", overrides.log_cache_url.clone())?
            .set_override_option("org", overrides.org.clone())?
            .set_override_option("space", overrides.space.clone())?;
        if overrides.skip_ssl_validation {
            builder = builder.set_override("skip_ssl_validation", true)?;
        }

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn api_url(&self) -> Result<Url> {
        let raw = self.api_url.as_deref().ok_or(ConfigError::MissingApiUrl)?;
        Url::parse(raw).with_context(|| format!("Invalid API URL '{}'", raw))
    }

    /// Explicit log-cache URL, or the one derived from the API URL
    pub fn log_cache_url(&self) -> Result<Url> {
        match &self.log_cache_url {
            Some(raw) => Url::parse(raw).with_context(|| format!("Invalid log-cache URL '{}'", raw)),
            None => derive_log_cache_url(&self.api_url()?),
        }
    }

    pub fn access_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingAccessToken.into())
    }

    pub fn org(&self) -> Result<&str> {
        self.org
            .as_deref()
            .ok_or_else(|| ConfigError::MissingTarget("org").into())
    }

    pub fn space(&self) -> Result<&str> {
        self.space
            .as_deref()
            .ok_or_else(|| ConfigError::MissingTarget("space").into())
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or("unknown user")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn history_window(&self) -> Result<chrono::Duration> {
        let invalid = || ConfigError::InvalidHistoryWindow(self.history_window_days);
        if self.history_window_days <= 0 {
            return Err(invalid().into());
        }
        Ok(chrono::Duration::try_days(self.history_window_days).ok_or_else(invalid)?)
    }

    /// Start of the history window ending at `to`
    pub fn history_start(&self, to: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let window = self.history_window()?;
        Ok(to
            .checked_sub_signed(window)
            .ok_or(ConfigError::InvalidHistoryWindow(self.history_window_days))?)
    }
}

/// Get the default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    let home = dirs_next::home_dir()?;
    Some(home.join(".config").join("cpu-entitlement").join("config.toml"))
}

/// Swap the first host label of the API URL for `log-cache`
pub fn derive_log_cache_url(api_url: &Url) -> Result<Url> {
    let underivable = || ConfigError::UnderivableLogCacheUrl(api_url.to_string());

    let host = api_url.host_str().ok_or_else(underivable)?;
    let domain = match host.split_once('.') {
        Some((_, domain)) if !domain.is_empty() => domain,
        _ => return Err(underivable().into()),
    };

    let mut url = api_url.clone();
    url.set_host(Some(&format!("log-cache.{}", domain)))
        .map_err(|_| underivable())?;
    url.set_path("");
    url.set_query(None);
    Ok(url)
}
