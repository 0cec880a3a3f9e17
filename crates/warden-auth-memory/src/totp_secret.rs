//! In-memory TOTP secret storage.

use async_trait::async_trait;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};

use warden_auth::storage::TotpSecretStorage;
use warden_auth::types::{AttemptReservation, UserTotpSecret};
use warden_auth::{AuthError, AuthResult};

/// TOTP secrets keyed by user identity.
#[derive(Debug, Default)]
pub struct InMemoryTotpSecretStorage {
    secrets: DashMap<String, UserTotpSecret>,
}

impl InMemoryTotpSecretStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the secret of a user.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<UserTotpSecret> {
        self.secrets.get(identity).map(|entry| entry.value().clone())
    }

    /// Runs `update` while holding the entry lock of the user's secret.
    fn update<T>(
        &self,
        identity: &str,
        update: impl FnOnce(&mut UserTotpSecret) -> T,
    ) -> AuthResult<T> {
        let mut secret = self
            .secrets
            .get_mut(identity)
            .ok_or_else(|| AuthError::storage(format!("no TOTP secret for '{identity}'")))?;
        Ok(update(secret.value_mut()))
    }
}

#[async_trait]
impl TotpSecretStorage for InMemoryTotpSecretStorage {
    async fn find_by_identity(&self, identity: &str) -> AuthResult<Option<UserTotpSecret>> {
        Ok(self.get(identity))
    }

    async fn save(&self, secret: &UserTotpSecret) -> AuthResult<()> {
        self.secrets.insert(secret.identity.clone(), secret.clone());
        Ok(())
    }

    async fn delete(&self, identity: &str) -> AuthResult<bool> {
        Ok(self.secrets.remove(identity).is_some())
    }

    async fn is_enabled_for_identity(&self, identity: &str) -> AuthResult<bool> {
        Ok(self
            .secrets
            .get(identity)
            .is_some_and(|secret| secret.is_active()))
    }

    async fn reserve_attempt(
        &self,
        identity: &str,
        at: OffsetDateTime,
        max_attempts: u32,
        window: Duration,
    ) -> AuthResult<AttemptReservation> {
        self.update(identity, |secret| {
            secret.reserve_attempt(at, max_attempts, window)
        })
    }

    async fn record_success(&self, identity: &str, at: OffsetDateTime) -> AuthResult<()> {
        self.update(identity, |secret| {
            secret.failed_attempts = 0;
            secret.last_used_at = Some(at);
        })
    }

    async fn enable(&self, identity: &str, backup_code_hashes: &[String]) -> AuthResult<bool> {
        let Some(mut secret) = self.secrets.get_mut(identity) else {
            return Ok(false);
        };
        if secret.enabled {
            return Ok(false);
        }
        secret.enabled = true;
        secret.confirmed = true;
        secret.backup_code_hashes = backup_code_hashes.to_vec();
        Ok(true)
    }

    async fn replace_backup_codes(
        &self,
        identity: &str,
        backup_code_hashes: &[String],
    ) -> AuthResult<bool> {
        let Some(mut secret) = self.secrets.get_mut(identity) else {
            return Ok(false);
        };
        if !secret.is_active() {
            return Ok(false);
        }
        secret.backup_code_hashes = backup_code_hashes.to_vec();
        Ok(true)
    }

    async fn consume_backup_code(&self, identity: &str, code_hash: &str) -> AuthResult<bool> {
        let Some(mut secret) = self.secrets.get_mut(identity) else {
            return Ok(false);
        };
        let Some(position) = secret
            .backup_code_hashes
            .iter()
            .position(|hash| hash == code_hash)
        else {
            return Ok(false);
        };
        secret.backup_code_hashes.swap_remove(position);
        Ok(true)
    }
}
