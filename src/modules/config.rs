//! Explicitly constructed configuration for the credential subsystem.
//!
//! Nothing here is global: an [`AuthConfig`] is built once at startup
//! (from the environment, a JSON file, or [`AuthConfig::ephemeral`] in
//! tests) and handed to [`crate::AuthService`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::security::{generate_secret, SigningSecrets};

const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_RESET_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_MARGIN_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("access and refresh secrets must differ")]
    SharedSecret,

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub reset_token_ttl_secs: u64,
    /// How far before "now" `password_changed_at` is stamped
    pub password_changed_margin_secs: u64,
    /// Minimum latency of a forgot-password response
    pub forgot_password_floor_ms: u64,
    pub store_timeout_ms: u64,
    pub notifier_timeout_ms: u64,
    pub pbkdf2_iterations: u32,
    pub min_password_length: usize,
    pub max_password_length: usize,
    /// Used to build the links sent by email
    pub public_base_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            reset_token_ttl_secs: 10 * 60,
            password_changed_margin_secs: 1,
            forgot_password_floor_ms: 2500,
            store_timeout_ms: 5000,
            notifier_timeout_ms: 10_000,
            pbkdf2_iterations: 100_000,
            min_password_length: 8,
            max_password_length: 128,
            public_base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("reset_token_ttl_secs", &self.reset_token_ttl_secs)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Load from environment variables on top of the defaults.
    ///
    /// `JWT_ACCESS_SECRET` and `JWT_REFRESH_SECRET` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.access_secret =
            lookup("JWT_ACCESS_SECRET").ok_or(ConfigError::Missing("JWT_ACCESS_SECRET"))?;
        config.refresh_secret =
            lookup("JWT_REFRESH_SECRET").ok_or(ConfigError::Missing("JWT_REFRESH_SECRET"))?;

        if let Some(url) = lookup("TRAILPASS_BASE_URL") {
            config.public_base_url = url;
        }
        if let Some(v) = parse_var(&lookup, "JWT_ACCESS_EXPIRES_IN_SECS")? {
            config.access_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "JWT_REFRESH_EXPIRES_IN_SECS")? {
            config.refresh_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TRAILPASS_RESET_TOKEN_TTL_SECS")? {
            config.reset_token_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TRAILPASS_PBKDF2_ITERATIONS")? {
            config.pbkdf2_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, "TRAILPASS_STORE_TIMEOUT_MS")? {
            config.store_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TRAILPASS_NOTIFIER_TIMEOUT_MS")? {
            config.notifier_timeout_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Fresh random secrets, cheap hashing and short delays. For tests and
    /// local experiments only.
    pub fn ephemeral() -> Self {
        Self {
            access_secret: generate_secret(),
            refresh_secret: generate_secret(),
            forgot_password_floor_ms: 25,
            store_timeout_ms: 1000,
            notifier_timeout_ms: 250,
            pbkdf2_iterations: 1000,
            ..Self::default()
        }
    }

    pub fn with_secrets(mut self, secrets: SigningSecrets) -> Self {
        self.access_secret = secrets.access;
        self.refresh_secret = secrets.refresh;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::Missing("access_secret"));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::Missing("refresh_secret"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.access_ttl_secs == 0 || self.access_ttl_secs >= self.refresh_ttl_secs {
            return Err(ConfigError::Invalid {
                key: "access_ttl_secs",
                value: self.access_ttl_secs.to_string(),
            });
        }
        check_range("refresh_ttl_secs", self.refresh_ttl_secs, 1, MAX_TTL_SECS)?;
        check_range("reset_token_ttl_secs", self.reset_token_ttl_secs, 1, MAX_RESET_TTL_SECS)?;
        check_range(
            "password_changed_margin_secs",
            self.password_changed_margin_secs,
            0,
            MAX_MARGIN_SECS,
        )?;
        if self.pbkdf2_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "pbkdf2_iterations",
                value: "0".to_string(),
            });
        }
        if self.min_password_length == 0 || self.min_password_length > self.max_password_length {
            return Err(ConfigError::Invalid {
                key: "min_password_length",
                value: self.min_password_length.to_string(),
            });
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }

    pub fn forgot_password_floor(&self) -> Duration {
        Duration::from_millis(self.forgot_password_floor_ms)
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        seconds(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        seconds(self.refresh_ttl_secs)
    }

    pub fn reset_token_ttl(&self) -> chrono::Duration {
        seconds(self.reset_token_ttl_secs)
    }

    pub fn password_changed_margin(&self) -> chrono::Duration {
        seconds(self.password_changed_margin_secs)
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

/// Saturates instead of panicking on values `validate` would reject
fn seconds(value: u64) -> chrono::Duration {
    let max = i64::MAX / 1000;
    chrono::Duration::seconds(i64::try_from(value).map_or(max, |v| v.min(max)))
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_requires_both_secrets() {
        let result = AuthConfig::from_lookup(lookup_from(&[("JWT_ACCESS_SECRET", "a")]));
        assert!(matches!(result, Err(ConfigError::Missing("JWT_REFRESH_SECRET"))));
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("JWT_ACCESS_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
            ("JWT_ACCESS_EXPIRES_IN_SECS", "300"),
            ("TRAILPASS_BASE_URL", "https://tours.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.access_ttl_secs, 300);
        assert_eq!(config.refresh_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.reset_token_ttl_secs, 600);
        assert_eq!(config.public_base_url, "https://tours.example.com");
    }

    #[test]
    fn test_env_rejects_garbage_numbers() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("JWT_ACCESS_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
            ("JWT_ACCESS_EXPIRES_IN_SECS", "15m"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "JWT_ACCESS_EXPIRES_IN_SECS", .. })
        ));
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        let result = AuthConfig::from_lookup(lookup_from(&[
            ("JWT_ACCESS_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
            ("JWT_REFRESH_EXPIRES_IN_SECS", "10000000000000"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "refresh_ttl_secs", .. })
        ));

        let mut config = AuthConfig::ephemeral();
        config.reset_token_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AuthConfig::ephemeral();
        config.password_changed_margin_secs = 3600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_saturate() {
        let config = AuthConfig {
            refresh_ttl_secs: u64::MAX,
            ..AuthConfig::default()
        };
        assert_eq!(config.refresh_ttl().num_seconds(), i64::MAX / 1000);
    }

    #[test]
    fn test_shared_secret_is_rejected() {
        let config = AuthConfig {
            access_secret: "same".to_string(),
            refresh_secret: "same".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SharedSecret)));
    }

    #[test]
    fn test_json_file_fills_missing_fields_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"access_secret": "a-secret", "refresh_secret": "r-secret", "pbkdf2_iterations": 5000}}"#
        )
        .unwrap();

        let config = AuthConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.pbkdf2_iterations, 5000);
        assert_eq!(config.min_password_length, 8);
        assert_eq!(config.access_ttl_secs, 900);
    }

    #[test]
    fn test_ephemeral_is_valid_and_unique() {
        let a = AuthConfig::ephemeral();
        let b = AuthConfig::ephemeral();
        assert!(a.validate().is_ok());
        assert_ne!(a.access_secret, b.access_secret);
        assert_ne!(a.access_secret, a.refresh_secret);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = AuthConfig::ephemeral();
        let printed = format!("{:?}", config);
        assert!(!printed.contains(&config.access_secret));
        assert!(printed.contains("<redacted>"));
    }
}
