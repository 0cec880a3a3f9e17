//! Authentication error types.
//!
//! Only policy violations, trust-boundary violations and infrastructure
//! failures are represented here. Outcomes a caller is expected to branch on
//! (a wrong one-time code, an unknown or expired bearer token, a refresh
//! token presented by the wrong client) are signalled with `bool` or
//! `Option` by the services and never become an [`AuthError`].

use std::fmt;

/// Errors that can occur while creating, verifying or rebuilding
/// authentication state.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A token variant was constructed with an empty firewall name.
    #[error("Token firewall name must not be empty")]
    EmptyFirewallName,

    /// A token attribute was read that has never been set.
    #[error("Attribute \"{name}\" does not exist")]
    AttributeNotFound {
        /// The attribute that was requested.
        name: String,
    },

    /// Persisted token state decoded into something that is not a token.
    #[error("Unexpected token type: {found}")]
    UnexpectedTokenType {
        /// Short description of the value that was decoded instead.
        found: String,
    },

    /// A new secret was requested while two-factor authentication is active.
    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    /// The operation requires two-factor authentication to be enabled.
    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    /// Too many failed verification attempts.
    #[error("Too many failed attempts, wait {} minutes before trying again", .retry_after_secs.div_ceil(60))]
    TwoFactorLocked {
        /// Seconds until the counter resets.
        retry_after_secs: u64,
    },

    /// A shared secret could not be decoded or is too short.
    #[error("Invalid shared secret: {message}")]
    InvalidSecret {
        /// Description of why the secret is invalid.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `AttributeNotFound` error.
    #[must_use]
    pub fn attribute_not_found(name: impl Into<String>) -> Self {
        Self::AttributeNotFound { name: name.into() }
    }

    /// Creates a new `UnexpectedTokenType` error.
    #[must_use]
    pub fn unexpected_token_type(found: impl Into<String>) -> Self {
        Self::UnexpectedTokenType {
            found: found.into(),
        }
    }

    /// Creates a new `TwoFactorLocked` error.
    #[must_use]
    pub fn two_factor_locked(retry_after_secs: u64) -> Self {
        Self::TwoFactorLocked { retry_after_secs }
    }

    /// Creates a new `InvalidSecret` error.
    #[must_use]
    pub fn invalid_secret(message: impl Into<String>) -> Self {
        Self::InvalidSecret {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller broke a rule it could have checked
    /// beforehand (lockout, enabling twice, bad construction input).
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::EmptyFirewallName
                | Self::AttributeNotFound { .. }
                | Self::TwoFactorAlreadyEnabled
                | Self::TwoFactorNotEnabled
                | Self::TwoFactorLocked { .. }
        )
    }

    /// Returns `true` if untrusted state failed to decode as a token.
    #[must_use]
    pub fn is_trust_boundary_violation(&self) -> bool {
        matches!(self, Self::UnexpectedTokenType { .. })
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_policy_violation()
            || self.is_trust_boundary_violation()
            || matches!(self, Self::InvalidSecret { .. })
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyFirewallName => ErrorCategory::Validation,
            Self::AttributeNotFound { .. } => ErrorCategory::Validation,
            Self::UnexpectedTokenType { .. } => ErrorCategory::Token,
            Self::TwoFactorAlreadyEnabled => ErrorCategory::Policy,
            Self::TwoFactorNotEnabled => ErrorCategory::Policy,
            Self::TwoFactorLocked { .. } => ErrorCategory::Authentication,
            Self::InvalidSecret { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication-related errors (identity verification).
    Authentication,
    /// Token-related errors (decoding, trust boundary).
    Token,
    /// Request validation errors.
    Validation,
    /// Rule violations such as enabling 2FA twice.
    Policy,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Policy => write!(f, "policy"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
