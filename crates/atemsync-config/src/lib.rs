//! Profile configuration for atemsync hosts.
//!
//! TOML profiles (one per switcher) merged with `ATEMSYNC_` environment
//! overrides, and translation to [`atemsync_core::SyncConfig`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atemsync_core::{RetryPolicy, SyncConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no profiles configured")]
    NoProfiles,

    #[error("host {host} is configured by both '{first}' and '{second}'")]
    DuplicateHost {
        host: String,
        first: String,
        second: String,
    },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named switcher profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reject two profiles pointing at the same switcher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for (name, profile) in &self.profiles {
            let host = profile.host.trim().to_ascii_lowercase();
            if let Some(first) = seen.insert(host.clone(), name) {
                return Err(ConfigError::DuplicateHost {
                    host,
                    first: first.to_owned(),
                    second: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Timings applied to every profile unless it overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            settle_delay_ms: default_settle_delay(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_probe_timeout() -> u64 {
    15
}
fn default_settle_delay() -> u64 {
    1000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    5
}

/// A named switcher profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Switcher address (e.g., "192.168.1.240").
    pub host: String,

    /// Override poll interval. 0 disables polling.
    pub poll_interval_secs: Option<u64>,

    pub connect_timeout_secs: Option<u64>,

    pub probe_timeout_secs: Option<u64>,

    pub settle_delay_ms: Option<u64>,

    pub retry_attempts: Option<u32>,

    pub retry_backoff_secs: Option<u64>,
}

impl Profile {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "atemsync", "atemsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("atemsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment. A missing file yields defaults.
///
/// Environment keys nest with a double underscore, e.g.
/// `ATEMSYNC_DEFAULTS__POLL_INTERVAL_SECS=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ATEMSYNC_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

/// Pick a profile by name, falling back to `default_profile`, then to
/// the only profile when exactly one exists.
pub fn resolve_profile<'a>(
    cfg: &'a Config,
    name: Option<&str>,
) -> Result<(&'a str, &'a Profile), ConfigError> {
    if cfg.profiles.is_empty() {
        return Err(ConfigError::NoProfiles);
    }

    let wanted = name.or(cfg.default_profile.as_deref());
    if let Some(wanted) = wanted {
        if let Some((key, profile)) = cfg.profiles.get_key_value(wanted) {
            return Ok((key.as_str(), profile));
        }
        // An explicit name must exist; a stale default may fall through.
        if name.is_some() || cfg.profiles.len() > 1 {
            return Err(ConfigError::UnknownProfile {
                name: wanted.to_owned(),
            });
        }
    }

    match cfg.profiles.iter().next() {
        Some((key, profile)) if cfg.profiles.len() == 1 => Ok((key.as_str(), profile)),
        _ => Err(ConfigError::Validation {
            field: "default_profile".into(),
            reason: "several profiles configured; name one".into(),
        }),
    }
}

/// Build a `SyncConfig` from a profile and the global defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let secs = |value: Option<u64>, fallback: u64| Duration::from_secs(value.unwrap_or(fallback));

    let config = SyncConfig {
        address: profile.host.trim().to_owned(),
        poll_interval: secs(profile.poll_interval_secs, defaults.poll_interval_secs),
        connect_timeout: secs(profile.connect_timeout_secs, defaults.connect_timeout_secs),
        probe_timeout: secs(profile.probe_timeout_secs, defaults.probe_timeout_secs),
        settle_delay: Duration::from_millis(
            profile.settle_delay_ms.unwrap_or(defaults.settle_delay_ms),
        ),
        retry: RetryPolicy {
            max_attempts: profile.retry_attempts.unwrap_or(defaults.retry_attempts),
            backoff: secs(profile.retry_backoff_secs, defaults.retry_backoff_secs),
        },
    };

    config.validate().map_err(|e| ConfigError::Validation {
        field: format!("profiles.{profile_name}"),
        reason: e.to_string(),
    })?;
    Ok(config)
}
