//! OAuth access/refresh token lifecycle.
//!
//! # State machine
//!
//! A record is usable while it is not revoked and `now` is before its
//! expiry. Refreshing revokes the presented record and issues a new pair, so
//! each refresh secret works exactly once:
//!
//! ```text
//! create ──► active ──refresh──► revoked (a new active record is created)
//!              │
//!              └──revoke / revoke_all──► revoked
//! ```
//!
//! Invalid, expired and revoked secrets yield `None`/`false`; only storage
//! failures are returned as errors.
//!
//! # Usage
//!
//! ```ignore
//! use warden_auth::oauth::{IssueRequest, OAuthTokenService};
//! use warden_auth::types::GrantType;
//!
//! let service = OAuthTokenService::new(storage, config.oauth.clone());
//! let issued = service
//!     .create(&IssueRequest::new("u1", "c1", GrantType::Password).with_scopes(["read"]))
//!     .await?;
//! let body = serde_json::to_string(&issued.to_response())?;
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::OAuthConfig;
use crate::error::AuthError;
use crate::oauth::response::IssuedToken;
use crate::storage::OAuthTokenStorage;
use crate::types::{GrantType, OAuthAccessToken, RequestMeta};

/// Parameters for issuing a new token pair.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// User the token is issued for.
    pub identity: String,

    /// Client the token is bound to.
    pub client_id: String,

    /// Grant that produced the token.
    pub grant_type: GrantType,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Requester metadata to record.
    pub meta: Option<RequestMeta>,

    /// Whether to issue a refresh secret alongside the bearer secret.
    pub include_refresh: bool,
}

impl IssueRequest {
    /// Creates a request with no scopes that includes a refresh secret.
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        client_id: impl Into<String>,
        grant_type: GrantType,
    ) -> Self {
        Self {
            identity: identity.into(),
            client_id: client_id.into(),
            grant_type,
            scopes: Vec::new(),
            meta: None,
            include_refresh: true,
        }
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Records requester metadata on the new record.
    #[must_use]
    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Issues only a bearer secret.
    #[must_use]
    pub fn without_refresh_token(mut self) -> Self {
        self.include_refresh = false;
        self
    }
}

/// Service creating, validating, rotating and revoking OAuth tokens.
pub struct OAuthTokenService {
    /// Token record storage.
    storage: Arc<dyn OAuthTokenStorage>,

    /// Token lifetimes.
    config: OAuthConfig,
}

impl OAuthTokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(storage: Arc<dyn OAuthTokenStorage>, config: OAuthConfig) -> Self {
        Self { storage, config }
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Issues a new bearer secret (and refresh secret, if requested).
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    pub async fn create(&self, request: &IssueRequest) -> AuthResult<IssuedToken> {
        self.create_at(request, OffsetDateTime::now_utc()).await
    }

    /// [`Self::create`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a configured lifetime pushes the expiry
    /// past the representable date range, or an error if the record cannot
    /// be stored.
    pub async fn create_at(
        &self,
        request: &IssueRequest,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        let access_token = OAuthAccessToken::generate_token();
        let refresh_token = request
            .include_refresh
            .then(OAuthAccessToken::generate_token);

        let meta = request.meta.clone().unwrap_or_default();

        let expires_at = now
            .checked_add(self.config.access_token_ttl())
            .ok_or_else(|| AuthError::configuration("access token expiry is out of range"))?;
        let refresh_token_expires_at = match &refresh_token {
            Some(_) => Some(
                now.checked_add(self.config.refresh_token_ttl())
                    .ok_or_else(|| {
                        AuthError::configuration("refresh token expiry is out of range")
                    })?,
            ),
            None => None,
        };

        let record = OAuthAccessToken {
            id: Uuid::new_v4(),
            identity: request.identity.clone(),
            token_hash: OAuthAccessToken::hash_token(&access_token),
            client_id: request.client_id.clone(),
            grant_type: request.grant_type,
            scopes: request.scopes.clone(),
            created_at: now,
            expires_at,
            refresh_token_hash: refresh_token
                .as_deref()
                .map(OAuthAccessToken::hash_token),
            refresh_token_expires_at,
            revoked: false,
            last_used_at: None,
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        };

        self.storage.create(&record).await?;

        tracing::debug!(
            token_id = %record.id,
            client_id = %record.client_id,
            grant_type = %record.grant_type,
            with_refresh = record.has_refresh_token(),
            "Issued OAuth token"
        );

        Ok(IssuedToken {
            record,
            access_token,
            refresh_token,
        })
    }

    /// Looks up a bearer secret and stamps `last_used_at` on success.
    ///
    /// Returns `None` if the secret is unknown, revoked or expired.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn validate(&self, bearer: &str) -> AuthResult<Option<OAuthAccessToken>> {
        self.validate_at(bearer, OffsetDateTime::now_utc()).await
    }

    /// [`Self::validate`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn validate_at(
        &self,
        bearer: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<OAuthAccessToken>> {
        let token_hash = OAuthAccessToken::hash_token(bearer);

        let Some(mut token) = self.storage.find_valid_by_hash(&token_hash, now).await? else {
            tracing::debug!("Bearer token not found, revoked or expired");
            return Ok(None);
        };

        if !token.is_valid_at(now) {
            tracing::debug!(token_id = %token.id, "Storage returned an unusable token");
            return Ok(None);
        }

        // Separate write: concurrent validations may overwrite each other's
        // timestamp, which never affects the authentication outcome.
        self.storage.touch_last_used(token.id, now).await?;
        token.last_used_at = Some(now);

        Ok(Some(token))
    }

    /// Exchanges a refresh secret for a new token pair.
    ///
    /// The presented record is revoked before the new pair is created, so a
    /// refresh secret can only be used once. Returns `None` if the secret is
    /// unknown, bound to another client, expired or already used.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        meta: Option<RequestMeta>,
    ) -> AuthResult<Option<IssuedToken>> {
        self.refresh_at(refresh_token, client_id, meta, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::refresh`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        client_id: &str,
        meta: Option<RequestMeta>,
        now: OffsetDateTime,
    ) -> AuthResult<Option<IssuedToken>> {
        let refresh_hash = OAuthAccessToken::hash_token(refresh_token);

        let Some(stored) = self.storage.find_by_refresh_hash(&refresh_hash).await? else {
            tracing::debug!(client_id = %client_id, "Unknown refresh token");
            return Ok(None);
        };

        if stored.client_id != client_id {
            tracing::debug!(
                token_id = %stored.id,
                client_id = %client_id,
                "Refresh token was issued to a different client"
            );
            return Ok(None);
        }

        if stored.is_refresh_expired_at(now) {
            tracing::debug!(token_id = %stored.id, "Refresh token expired");
            return Ok(None);
        }

        if stored.revoked {
            tracing::warn!(
                token_id = %stored.id,
                client_id = %client_id,
                "Revoked refresh token presented, possible replay"
            );
            return Ok(None);
        }

        // Compare-and-swap: of two concurrent refreshes only one wins.
        if !self.storage.revoke_if_active(stored.id).await? {
            tracing::warn!(
                token_id = %stored.id,
                client_id = %client_id,
                "Refresh token rotated concurrently"
            );
            return Ok(None);
        }

        let mut request = IssueRequest::new(stored.identity, stored.client_id, GrantType::RefreshToken)
            .with_scopes(stored.scopes);
        request.meta = meta;

        let issued = self.create_at(&request, now).await?;

        tracing::debug!(
            old_token_id = %stored.id,
            new_token_id = %issued.record.id,
            "Rotated refresh token"
        );

        Ok(Some(issued))
    }

    /// Revokes the record of a bearer secret.
    ///
    /// Returns `true` if a record with that secret exists, whether or not
    /// it was already revoked.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn revoke(&self, bearer: &str) -> AuthResult<bool> {
        let token_hash = OAuthAccessToken::hash_token(bearer);

        let Some(token) = self.storage.find_by_hash(&token_hash).await? else {
            return Ok(false);
        };

        if self.storage.revoke_if_active(token.id).await? {
            tracing::debug!(token_id = %token.id, "Revoked OAuth token");
        }

        Ok(true)
    }

    /// Revokes every token of a user (logout everywhere, password change).
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn revoke_all_for_identity(&self, identity: &str) -> AuthResult<u64> {
        let count = self.storage.revoke_all_for_identity(identity).await?;
        tracing::info!(identity = %identity, count, "Revoked all OAuth tokens");
        Ok(count)
    }

    /// Deletes records whose secrets have all expired.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.cleanup_expired_at(OffsetDateTime::now_utc()).await
    }

    /// [`Self::cleanup_expired`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn cleanup_expired_at(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let count = self.storage.delete_expired(now).await?;
        if count > 0 {
            tracing::info!(count, "Deleted expired OAuth tokens");
        }
        Ok(count)
    }

    /// Lists the usable tokens of a user, e.g. for a sessions screen.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_active_for_identity(
        &self,
        identity: &str,
    ) -> AuthResult<Vec<OAuthAccessToken>> {
        self.storage
            .list_active_for_identity(identity, OffsetDateTime::now_utc())
            .await
    }
}
