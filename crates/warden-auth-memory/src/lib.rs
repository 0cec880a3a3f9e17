//! In-memory storage backend for Warden authentication.
//!
//! This crate implements the storage traits of `warden-auth` on top of
//! `DashMap`. Single-record updates (revocation, failure counters, backup
//! code consumption) run under the entry lock of the record, which gives
//! them the atomicity the services rely on.
//!
//! Data lives only as long as the process. Use it for tests and
//! single-node deployments.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_auth::{AuthConfig, OAuthTokenService, TwoFactorService};
//! use warden_auth_memory::{InMemoryOAuthTokenStorage, InMemoryTotpSecretStorage};
//!
//! let config = AuthConfig::default();
//! let oauth = OAuthTokenService::new(
//!     Arc::new(InMemoryOAuthTokenStorage::new()),
//!     config.oauth.clone(),
//! );
//! let two_factor = TwoFactorService::new(
//!     Arc::new(InMemoryTotpSecretStorage::new()),
//!     config.two_factor.clone(),
//! );
//! ```

pub mod oauth_token;
pub mod totp_secret;

pub use oauth_token::InMemoryOAuthTokenStorage;
pub use totp_secret::InMemoryTotpSecretStorage;
