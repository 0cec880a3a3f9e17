//! Storage traits for authentication data.
//!
//! This module defines the persistence contracts the services rely on:
//!
//! - OAuth access and refresh token records
//! - Per-user TOTP secrets and backup codes
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `warden-auth-memory` - in-memory storage backend

pub mod oauth_token;
pub mod totp_secret;

pub use oauth_token::OAuthTokenStorage;
pub use totp_secret::TotpSecretStorage;
