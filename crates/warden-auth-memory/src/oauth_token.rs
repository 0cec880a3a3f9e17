//! In-memory OAuth token storage.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use warden_auth::storage::OAuthTokenStorage;
use warden_auth::types::OAuthAccessToken;
use warden_auth::{AuthError, AuthResult};

/// OAuth token records keyed by id, with secondary indexes on the bearer
/// and refresh hashes.
///
/// Status changes go through `DashMap::get_mut`, which holds the shard lock
/// of the record for the whole read-modify-write.
#[derive(Debug, Default)]
pub struct InMemoryOAuthTokenStorage {
    tokens: DashMap<Uuid, OAuthAccessToken>,
    by_token_hash: DashMap<String, Uuid>,
    by_refresh_hash: DashMap<String, Uuid>,
}

impl InMemoryOAuthTokenStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including revoked and expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns a copy of a record by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<OAuthAccessToken> {
        self.tokens.get(&id).map(|entry| entry.value().clone())
    }

    fn lookup(&self, index: &DashMap<String, Uuid>, hash: &str) -> Option<OAuthAccessToken> {
        let id = *index.get(hash)?;
        self.get(id)
    }

    fn remove(&self, id: Uuid) {
        if let Some((_, token)) = self.tokens.remove(&id) {
            self.by_token_hash.remove(&token.token_hash);
            if let Some(refresh_hash) = token.refresh_token_hash {
                self.by_refresh_hash.remove(&refresh_hash);
            }
        }
    }
}

#[async_trait]
impl OAuthTokenStorage for InMemoryOAuthTokenStorage {
    async fn create(&self, token: &OAuthAccessToken) -> AuthResult<()> {
        match self.by_token_hash.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => return Err(AuthError::storage("duplicate token hash")),
            Entry::Vacant(slot) => {
                slot.insert(token.id);
            }
        }

        if let Some(refresh_hash) = &token.refresh_token_hash {
            match self.by_refresh_hash.entry(refresh_hash.clone()) {
                Entry::Occupied(_) => {
                    self.by_token_hash.remove(&token.token_hash);
                    return Err(AuthError::storage("duplicate refresh token hash"));
                }
                Entry::Vacant(slot) => {
                    slot.insert(token.id);
                }
            }
        }

        self.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_valid_by_hash(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<OAuthAccessToken>> {
        Ok(self
            .lookup(&self.by_token_hash, token_hash)
            .filter(|token| token.is_valid_at(now)))
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<OAuthAccessToken>> {
        Ok(self.lookup(&self.by_token_hash, token_hash))
    }

    async fn find_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> AuthResult<Option<OAuthAccessToken>> {
        Ok(self.lookup(&self.by_refresh_hash, refresh_hash))
    }

    async fn touch_last_used(&self, id: Uuid, at: OffsetDateTime) -> AuthResult<()> {
        if let Some(mut token) = self.tokens.get_mut(&id) {
            token.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_if_active(&self, id: Uuid) -> AuthResult<bool> {
        let Some(mut token) = self.tokens.get_mut(&id) else {
            return Ok(false);
        };
        if token.revoked {
            return Ok(false);
        }
        token.revoked = true;
        Ok(true)
    }

    async fn revoke_all_for_identity(&self, identity: &str) -> AuthResult<u64> {
        let mut count = 0u64;
        for mut token in self.tokens.iter_mut() {
            if token.identity == identity && !token.revoked {
                token.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let expired: Vec<Uuid> = self
            .tokens
            .iter()
            .filter(|token| token.is_fully_expired_at(now))
            .map(|token| token.id)
            .collect();

        for id in &expired {
            self.remove(*id);
        }

        tracing::trace!(count = expired.len(), "Swept expired OAuth tokens");
        Ok(expired.len() as u64)
    }

    async fn list_active_for_identity(
        &self,
        identity: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Vec<OAuthAccessToken>> {
        let mut tokens: Vec<OAuthAccessToken> = self
            .tokens
            .iter()
            .filter(|token| token.identity == identity && token.is_valid_at(now))
            .map(|token| token.value().clone())
            .collect();
        tokens.sort_by_key(|token| token.created_at);
        Ok(tokens)
    }
}
