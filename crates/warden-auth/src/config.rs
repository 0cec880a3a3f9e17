//! Authentication engine configuration.
//!
//! Lifetimes are written as human readable durations (`"1h"`, `"30d"`) and
//! parsed with `humantime_serde`. Every section falls back to its defaults,
//! so an empty document is a valid configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::token::MAX_PENDING_TOKEN_LIFETIME;

/// Longest accepted access token lifetime.
pub const MAX_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

/// Longest accepted refresh token lifetime.
pub const MAX_REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// Longest accepted lockout window.
pub const MAX_LOCKOUT_DURATION: Duration = Duration::from_secs(24 * 3600);

/// Root configuration for the authentication engine.
///
/// # Example (TOML)
///
/// ```toml
/// [oauth]
/// access_token_lifetime = "1h"
/// refresh_token_lifetime = "30d"
///
/// [two_factor]
/// issuer = "Warden"
/// max_failed_attempts = 5
/// lockout_duration = "15m"
///
/// [role_hierarchy.roles]
/// ROLE_ADMIN = ["ROLE_EDITOR"]
/// ROLE_EDITOR = ["ROLE_USER"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth access/refresh token settings.
    pub oauth: OAuthConfig,

    /// TOTP and backup code settings.
    pub two_factor: TwoFactorConfig,

    /// Static role inheritance map.
    pub role_hierarchy: RoleHierarchyConfig,
}

/// OAuth token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    /// Refreshing always issues a new pair with a fresh lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(3600), // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

impl OAuthConfig {
    /// Access token lifetime as a [`time::Duration`].
    #[must_use]
    pub fn access_token_ttl(&self) -> time::Duration {
        to_time_duration(self.access_token_lifetime)
    }

    /// Refresh token lifetime as a [`time::Duration`].
    #[must_use]
    pub fn refresh_token_ttl(&self) -> time::Duration {
        to_time_duration(self.refresh_token_lifetime)
    }
}

/// Two-factor authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TwoFactorConfig {
    /// Application name shown by authenticator apps.
    pub issuer: String,

    /// Number of digits in a generated code.
    pub digits: usize,

    /// Length of one TOTP time step.
    #[serde(with = "humantime_serde")]
    pub step: Duration,

    /// Adjacent steps accepted on either side of the current one.
    pub skew: u8,

    /// Failed verifications tolerated before the secret is locked.
    pub max_failed_attempts: u32,

    /// How long a locked secret stays locked after the last failure.
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,

    /// Number of backup codes issued per batch.
    pub backup_code_count: usize,

    /// How long a partially authenticated login may wait for its second factor.
    #[serde(with = "humantime_serde")]
    pub pending_token_lifetime: Duration,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            issuer: "Warden".to_string(),
            digits: 6,
            step: Duration::from_secs(30),
            skew: 1,
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            backup_code_count: 10,
            pending_token_lifetime: Duration::from_secs(600),
        }
    }
}

impl TwoFactorConfig {
    /// Lockout window as a [`time::Duration`].
    #[must_use]
    pub fn lockout_ttl(&self) -> time::Duration {
        to_time_duration(self.lockout_duration)
    }

    /// Pending login lifetime as a [`time::Duration`].
    #[must_use]
    pub fn pending_token_ttl(&self) -> time::Duration {
        to_time_duration(self.pending_token_lifetime)
    }
}

/// Role inheritance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleHierarchyConfig {
    /// Role name to the roles it directly implies.
    pub roles: HashMap<String, Vec<String>>,

    /// Maximum number of memoized role sets.
    pub cache_capacity: usize,
}

impl Default for RoleHierarchyConfig {
    fn default() -> Self {
        Self {
            roles: HashMap::new(),
            cache_capacity: 1024,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl AuthConfig {
    /// Parses and validates a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and any error
    /// produced by [`AuthConfig::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A token lifetime, the TOTP step or the lockout window is zero
    /// - A token lifetime or the lockout window exceeds its `MAX_*` bound
    /// - The digit count is outside 6..=8
    /// - `max_failed_attempts` or `backup_code_count` is zero
    /// - The issuer contains `:` (it is embedded in the otpauth label)
    ///
    /// Returns `ConfigError::Missing` if the issuer is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_lifetime(
            "oauth.access_token_lifetime",
            self.oauth.access_token_lifetime,
            MAX_ACCESS_TOKEN_LIFETIME,
        )?;
        check_lifetime(
            "oauth.refresh_token_lifetime",
            self.oauth.refresh_token_lifetime,
            MAX_REFRESH_TOKEN_LIFETIME,
        )?;

        let two_factor = &self.two_factor;

        check_lifetime(
            "two_factor.lockout_duration",
            two_factor.lockout_duration,
            MAX_LOCKOUT_DURATION,
        )?;
        check_lifetime(
            "two_factor.pending_token_lifetime",
            two_factor.pending_token_lifetime,
            MAX_PENDING_TOKEN_LIFETIME.unsigned_abs(),
        )?;

        if two_factor.issuer.is_empty() {
            return Err(ConfigError::Missing("two_factor.issuer".to_string()));
        }

        if two_factor.issuer.contains(':') {
            return Err(ConfigError::InvalidValue(format!(
                "two_factor.issuer '{}' must not contain ':'",
                two_factor.issuer
            )));
        }

        if !(6..=8).contains(&two_factor.digits) {
            return Err(ConfigError::InvalidValue(format!(
                "two_factor.digits must be between 6 and 8, got {}",
                two_factor.digits
            )));
        }

        if two_factor.step.as_secs() == 0 {
            return Err(ConfigError::InvalidValue(
                "two_factor.step must be at least one second".to_string(),
            ));
        }

        if two_factor.max_failed_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "two_factor.max_failed_attempts must be > 0".to_string(),
            ));
        }

        if two_factor.backup_code_count == 0 {
            return Err(ConfigError::InvalidValue(
                "two_factor.backup_code_count must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_lifetime(name: &str, value: Duration, max: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
    }
    if value > max {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be at most {max:?}, got {value:?}"
        )));
    }
    Ok(())
}

fn to_time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.oauth.access_token_ttl(), time::Duration::hours(1));
        assert_eq!(config.oauth.refresh_token_ttl(), time::Duration::days(30));
        assert_eq!(config.two_factor.max_failed_attempts, 5);
        assert_eq!(config.two_factor.lockout_ttl(), time::Duration::minutes(15));
        assert_eq!(
            config.two_factor.pending_token_ttl(),
            time::Duration::seconds(600)
        );
    }

    #[test]
    fn test_from_toml_str() {
        let config = AuthConfig::from_toml_str(
            r#"
            [oauth]
            access_token_lifetime = "15m"

            [two_factor]
            issuer = "Acme"
            max_failed_attempts = 3

            [role_hierarchy]
            cache_capacity = 16

            [role_hierarchy.roles]
            ROLE_ADMIN = ["ROLE_USER", "ROLE_EDITOR"]
            "#,
        )
        .unwrap();

        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(900));
        // Untouched keys keep their defaults.
        assert_eq!(
            config.oauth.refresh_token_lifetime,
            Duration::from_secs(30 * 24 * 3600)
        );
        assert_eq!(config.two_factor.issuer, "Acme");
        assert_eq!(config.two_factor.max_failed_attempts, 3);
        assert_eq!(config.two_factor.digits, 6);
        assert_eq!(config.role_hierarchy.cache_capacity, 16);
        assert_eq!(
            config.role_hierarchy.roles["ROLE_ADMIN"],
            vec!["ROLE_USER".to_string(), "ROLE_EDITOR".to_string()]
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AuthConfig::from_toml_str("").unwrap();
        assert_eq!(config.two_factor.issuer, "Warden");
        assert!(config.role_hierarchy.roles.is_empty());
    }

    #[test]
    fn test_malformed_toml() {
        let err = AuthConfig::from_toml_str("[oauth\naccess").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = AuthConfig::from_toml_str("[oauth]\naccess_token_lifetime = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AuthConfig::default();
        config.two_factor.issuer = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let mut config = AuthConfig::default();
        config.two_factor.issuer = "Acme:Prod".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.digits = 4;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.step = Duration::from_millis(500);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.max_failed_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.oauth.access_token_lifetime = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_lifetimes_have_upper_bounds() {
        let mut config = AuthConfig::default();
        config.oauth.access_token_lifetime = Duration::from_secs(u64::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.oauth.refresh_token_lifetime = MAX_REFRESH_TOKEN_LIFETIME + Duration::from_secs(1);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.lockout_duration = Duration::from_secs(7 * 24 * 3600);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.pending_token_lifetime = Duration::from_secs(2 * 24 * 3600);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.two_factor.pending_token_lifetime = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = AuthConfig::default();
        config.oauth.access_token_lifetime = MAX_ACCESS_TOKEN_LIFETIME;
        config.oauth.refresh_token_lifetime = MAX_REFRESH_TOKEN_LIFETIME;
        config.two_factor.lockout_duration = MAX_LOCKOUT_DURATION;
        config.two_factor.pending_token_lifetime = Duration::from_secs(24 * 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_lifetime_in_toml_is_rejected() {
        let err = AuthConfig::from_toml_str("[oauth]\naccess_token_lifetime = \"1000years\"")
            .unwrap_err();
        let ConfigError::InvalidValue(message) = err else {
            panic!("expected InvalidValue, got {err:?}");
        };
        assert!(message.contains("oauth.access_token_lifetime"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");

        let err = ConfigError::Missing("issuer".to_string());
        assert_eq!(err.to_string(), "Missing required configuration: issuer");
    }
}
