//! OAuth token storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Revocation must be atomic: two concurrent callers may not both observe
//!   a successful [`OAuthTokenStorage::revoke_if_active`] for the same record
//! - Expired tokens are only removed by [`OAuthTokenStorage::delete_expired`]

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::OAuthAccessToken;

/// Storage trait for OAuth access/refresh token records.
///
/// # Implementations
///
/// - `warden-auth-memory` - in-memory backend
#[async_trait]
pub trait OAuthTokenStorage: Send + Sync {
    /// Stores a new token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored (e.g., duplicate hash,
    /// storage unavailable).
    async fn create(&self, token: &OAuthAccessToken) -> AuthResult<()>;

    /// Finds a record by bearer hash that is neither revoked nor expired
    /// at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_valid_by_hash(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<OAuthAccessToken>>;

    /// Finds a record by bearer hash regardless of its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<OAuthAccessToken>>;

    /// Finds a record by refresh hash regardless of its status.
    /// Callers must check revocation and refresh expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> AuthResult<Option<OAuthAccessToken>>;

    /// Stamps `last_used_at` on a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. A missing record is
    /// not an error.
    async fn touch_last_used(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<()>;

    /// Flips `revoked` from `false` to `true` atomically.
    ///
    /// # Returns
    ///
    /// `true` if this call revoked the record, `false` if it was already
    /// revoked or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_if_active(&self, id: Uuid) -> AuthResult<bool>;

    /// Revokes every record of a user.
    ///
    /// # Returns
    ///
    /// The number of records that were revoked by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn revoke_all_for_identity(&self, identity: &str) -> AuthResult<u64>;

    /// Deletes records whose bearer and refresh secrets have both expired.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;

    /// Lists the non-revoked, non-expired records of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn list_active_for_identity(
        &self,
        identity: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<OAuthAccessToken>>;
}
