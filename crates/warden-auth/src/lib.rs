//! # warden-auth
//!
//! Authentication state engine.
//!
//! This crate provides:
//! - A closed token model describing how a request authenticated
//! - Role hierarchy expansion with per-instance memoization
//! - Safe reconstruction of token state from untrusted session bytes
//! - OAuth 2.1 bearer/refresh token lifecycle with single-use rotation
//! - TOTP two-factor authentication with lockout and backup codes
//!
//! Persistence is abstracted behind the traits in [`storage`]; the
//! `warden-auth-memory` crate provides an in-memory backend.
//!
//! ## Modules
//!
//! - [`config`] - Token lifetimes, TOTP parameters and role inheritance
//! - [`token`] - Token model, principal and the token state reconstructor
//! - [`role_hierarchy`] - Role inheritance closure
//! - [`oauth`] - OAuth token service and token endpoint response
//! - [`two_factor`] - TOTP service and backup codes
//! - [`types`] - Persisted records
//! - [`storage`] - Storage traits for auth-related data

pub mod config;
pub mod error;
pub mod oauth;
pub mod role_hierarchy;
pub mod storage;
pub mod token;
pub mod two_factor;
pub mod types;

pub use config::{AuthConfig, ConfigError, OAuthConfig, RoleHierarchyConfig, TwoFactorConfig};
pub use error::{AuthError, ErrorCategory};
pub use oauth::{IssueRequest, IssuedToken, OAuthTokenService, TokenResponse};
pub use role_hierarchy::RoleHierarchy;
pub use storage::{OAuthTokenStorage, TotpSecretStorage};
pub use token::{
    MAX_PENDING_TOKEN_LIFETIME, PENDING_TOKEN_LIFETIME, Principal, Token, TokenKind,
    TokenReconstructor,
};
pub use two_factor::{SecondFactor, TwoFactorService};
pub use types::{AttemptReservation, GrantType, OAuthAccessToken, RequestMeta, UserTotpSecret};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use warden_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::oauth::{IssueRequest, IssuedToken, OAuthTokenService, TokenResponse};
    pub use crate::role_hierarchy::RoleHierarchy;
    pub use crate::storage::{OAuthTokenStorage, TotpSecretStorage};
    pub use crate::token::{Principal, Token, TokenKind, TokenReconstructor};
    pub use crate::two_factor::{SecondFactor, TwoFactorService};
    pub use crate::types::{
        AttemptReservation, GrantType, OAuthAccessToken, RequestMeta, UserTotpSecret,
    };
}
