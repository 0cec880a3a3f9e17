//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing_subscriber::EnvFilter;
use warden_auth::{AuthConfig, OAuthTokenService, TwoFactorService, UserTotpSecret};
use warden_auth_memory::{InMemoryOAuthTokenStorage, InMemoryTotpSecretStorage};

/// Routes `tracing` output to the test harness (`RUST_LOG=debug` to see it).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed clock used by time-dependent tests.
pub fn test_now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp")
}

pub struct Harness {
    pub config: AuthConfig,
    pub oauth_storage: Arc<InMemoryOAuthTokenStorage>,
    pub totp_storage: Arc<InMemoryTotpSecretStorage>,
    pub oauth: OAuthTokenService,
    pub two_factor: TwoFactorService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        init_tracing();
        let oauth_storage = Arc::new(InMemoryOAuthTokenStorage::new());
        let totp_storage = Arc::new(InMemoryTotpSecretStorage::new());
        Self {
            oauth: OAuthTokenService::new(oauth_storage.clone(), config.oauth.clone()),
            two_factor: TwoFactorService::new(totp_storage.clone(), config.two_factor.clone()),
            config,
            oauth_storage,
            totp_storage,
        }
    }
}

/// Generates the authenticator app code for `secret` at `at`.
pub fn totp_code(secret: &UserTotpSecret, at: OffsetDateTime) -> String {
    let bytes = Secret::Encoded(secret.secret.clone())
        .to_bytes()
        .expect("stored secret is base32");
    let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "test".to_string())
        .expect("valid TOTP parameters");
    totp.generate(u64::try_from(at.unix_timestamp()).expect("positive timestamp"))
}

/// A six digit code that is not valid within one step of `at`.
pub fn wrong_code(secret: &UserTotpSecret, at: OffsetDateTime) -> String {
    let valid: Vec<String> = [-30, 0, 30]
        .into_iter()
        .map(|offset| totp_code(secret, at + time::Duration::seconds(offset)))
        .collect();
    (0..1_000_000)
        .map(|n| format!("{n:06}"))
        .find(|candidate| !valid.contains(candidate))
        .expect("some code is invalid")
}
