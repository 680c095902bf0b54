//! TOML-based application configuration.
//!
//! Stores:
//! - Remote backend location and project key
//! - Sync scheduling and retry/backoff settings
//! - Log filter
//!
//! Configuration is stored at `~/.config/waterlog/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

const MAX_PERIODIC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Remote backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST backend, e.g. `https://project.example.co`.
    #[serde(default)]
    pub url: String,
    /// Project API key sent with every request.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sync scheduling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_periodic_interval_minutes")]
    pub periodic_interval_minutes: u64,
    #[serde(default = "default_true")]
    pub require_battery_not_low: bool,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/waterlog/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_table() -> String {
    "water_activities".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_periodic_interval_minutes() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_max_retry_attempts() -> u32 {
    5
}
fn default_initial_backoff_secs() -> u64 {
    30
}
fn default_max_backoff_secs() -> u64 {
    3600
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: default_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            periodic_interval_minutes: default_periodic_interval_minutes(),
            require_battery_not_low: true,
            max_retry_attempts: default_max_retry_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl RemoteConfig {
    /// Both a URL and a key are required before any remote call is made.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// Clamped to between one minute and one week.
    pub fn periodic_interval(&self) -> Duration {
        let minutes = self
            .periodic_interval_minutes
            .clamp(1, MAX_PERIODIC_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts.max(1),
            initial_delay: Duration::from_secs(self.initial_backoff_secs),
            max_delay: Duration::from_secs(self.max_backoff_secs),
            multiplier: self.backoff_multiplier.max(1.0),
        }
    }
}

/// Exponential backoff applied by the scheduler when a cycle asks to be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total runs allowed for one request, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before run number `attempt` (0-indexed; the first run has none).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_nan() || capped <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SyncConfig::default().retry_policy()
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value has the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.remote.table, "water_activities");
        assert_eq!(parsed.sync.periodic_interval_minutes, 15);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [remote]
            url = "https://example.test"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.remote.url, "https://example.test");
        assert_eq!(parsed.remote.timeout_secs, 30);
        assert!(parsed.sync.require_battery_not_low);
        assert_eq!(parsed.logging.filter, "info");
    }

    #[test]
    fn remote_requires_url_and_key() {
        let mut remote = RemoteConfig::default();
        assert!(!remote.is_configured());
        remote.url = "https://example.test".into();
        assert!(!remote.is_configured());
        remote.api_key = "key".into();
        assert!(remote.is_configured());
    }

    #[test]
    fn get_and_set_by_dotted_key() {
        let mut cfg = Config::default();
        cfg.set("remote.url", "https://example.test").unwrap();
        cfg.set("sync.periodic_interval_minutes", "30").unwrap();
        cfg.set("sync.require_battery_not_low", "false").unwrap();
        cfg.set("sync.backoff_multiplier", "1.5").unwrap();

        assert_eq!(cfg.get("remote.url").as_deref(), Some("https://example.test"));
        assert_eq!(cfg.sync.periodic_interval_minutes, 30);
        assert!(!cfg.sync.require_battery_not_low);
        assert_eq!(cfg.sync.backoff_multiplier, 1.5);
    }

    #[test]
    fn extreme_backoff_values_do_not_panic() {
        let mut cfg = Config::default();
        cfg.set("sync.initial_backoff_secs", &u64::MAX.to_string()).unwrap();
        cfg.set("sync.max_backoff_secs", &u64::MAX.to_string()).unwrap();
        let policy = cfg.sync.retry_policy();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(u64::MAX));

        let small_cap = SyncConfig {
            initial_backoff_secs: u64::MAX,
            max_backoff_secs: 60,
            ..SyncConfig::default()
        };
        assert_eq!(
            small_cap.retry_policy().delay_for_attempt(3),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn periodic_interval_is_clamped() {
        let mut cfg = Config::default();
        cfg.set("sync.periodic_interval_minutes", &(1u64 << 62).to_string())
            .unwrap();
        assert_eq!(cfg.sync.periodic_interval(), Duration::from_secs(7 * 24 * 3600));

        cfg.set("sync.periodic_interval_minutes", "0").unwrap();
        assert_eq!(cfg.sync.periodic_interval(), Duration::from_secs(60));
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("remote.nope", "x"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("remote", "x"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("sync.max_retry_attempts", "many"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn load_from_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.remote.api_key = "secret".into();
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().remote.api_key, "secret");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[remote\nurl = ").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(RetryPolicy::default().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(100),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(100));
        assert_eq!(policy.delay_for_attempt(50), Duration::from_secs(100));
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_bounded(
            initial in 0u64..600,
            max in 0u64..7200,
            multiplier in 1.0f64..4.0,
            attempt in 1u32..64,
        ) {
            let policy = RetryPolicy {
                max_attempts: 64,
                initial_delay: Duration::from_secs(initial),
                max_delay: Duration::from_secs(max),
                multiplier,
            };
            let here = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            prop_assert!(here <= Duration::from_secs(max));
            prop_assert!(next >= here);
        }
    }
}
