//! TOTP secret storage trait.
//!
//! Everything except [`TotpSecretStorage::save`] is a single-row
//! read-modify-write that touches only the fields it names. Implementations
//! must perform each of them atomically (row lock, `UPDATE ... RETURNING`,
//! or an entry lock) so concurrent verifications cannot exceed the attempt
//! limit, spend a backup code twice or overwrite each other's fields.

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::types::{AttemptReservation, UserTotpSecret};

/// Storage trait for per-user TOTP secrets.
///
/// # Implementations
///
/// - `warden-auth-memory` - in-memory backend
#[async_trait]
pub trait TotpSecretStorage: Send + Sync {
    /// Finds the secret of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identity(&self, identity: &str) -> AuthResult<Option<UserTotpSecret>>;

    /// Inserts or replaces the secret of `secret.identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, secret: &UserTotpSecret) -> AuthResult<()>;

    /// Deletes the secret of a user.
    ///
    /// # Returns
    ///
    /// `true` if a secret was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, identity: &str) -> AuthResult<bool>;

    /// Returns `true` if the user has an enabled and confirmed secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_enabled_for_identity(&self, identity: &str) -> AuthResult<bool>;

    /// Applies [`UserTotpSecret::reserve_attempt`] to the stored secret
    /// atomically and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the secret does not exist or the operation
    /// fails.
    async fn reserve_attempt(
        &self,
        identity: &str,
        at: OffsetDateTime,
        max_attempts: u32,
        window: Duration,
    ) -> AuthResult<AttemptReservation>;

    /// Resets the failure counter and stamps `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the secret does not exist or the operation
    /// fails.
    async fn record_success(&self, identity: &str, at: OffsetDateTime) -> AuthResult<()>;

    /// Marks a not yet enabled secret as enabled and confirmed and stores
    /// its first backup codes. Counters and timestamps are left untouched.
    ///
    /// # Returns
    ///
    /// `false` if there is no secret or it is already enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn enable(&self, identity: &str, backup_code_hashes: &[String]) -> AuthResult<bool>;

    /// Replaces the backup codes of an enabled secret.
    ///
    /// # Returns
    ///
    /// `false` if there is no enabled and confirmed secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn replace_backup_codes(
        &self,
        identity: &str,
        backup_code_hashes: &[String],
    ) -> AuthResult<bool>;

    /// Removes `code_hash` from the stored backup codes.
    ///
    /// # Returns
    ///
    /// `true` if the hash was present and has been removed by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume_backup_code(&self, identity: &str, code_hash: &str) -> AuthResult<bool>;
}
