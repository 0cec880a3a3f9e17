//! OAuth access token domain type.
//!
//! # Security
//!
//! - Bearer and refresh secrets are stored as SHA-256 hashes, never plaintext
//! - The plaintext exists only on the [`crate::oauth::IssuedToken`] returned
//!   at creation time and cannot be recovered from a stored record
//! - Expired records stay in storage until the cleanup sweep removes them

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Client Credentials flow.
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
    /// Resource Owner Password Credentials flow (legacy, first-party only).
    Password,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            "refresh_token" => Ok(Self::RefreshToken),
            "password" => Ok(Self::Password),
            other => Err(format!("unknown grant type: {}", other)),
        }
    }
}

/// Request metadata recorded on newly issued tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Client IP address.
    pub ip_address: Option<IpAddr>,
    /// Client `User-Agent` header.
    pub user_agent: Option<String>,
}

impl RequestMeta {
    /// Creates request metadata.
    #[must_use]
    pub fn new(ip_address: Option<IpAddr>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Access token record, optionally paired with a refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAccessToken {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// Identifier of the user the token was issued for.
    pub identity: String,

    /// SHA-256 hash of the bearer secret.
    pub token_hash: String,

    /// Client the token is bound to.
    pub client_id: String,

    /// Grant that produced the token.
    pub grant_type: GrantType,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// When this record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the bearer secret stops being accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// SHA-256 hash of the refresh secret, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_hash: Option<String>,

    /// When the refresh secret stops being accepted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub refresh_token_expires_at: Option<OffsetDateTime>,

    /// Whether the record has been revoked (explicitly or by rotation).
    #[serde(default)]
    pub revoked: bool,

    /// Last successful validation.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_used_at: Option<OffsetDateTime>,

    /// IP address of the requester that obtained the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,

    /// User agent of the requester that obtained the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl OAuthAccessToken {
    /// Returns `true` if the bearer secret has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Returns `true` if the bearer secret has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if the bearer secret is usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Returns `true` if a refresh secret was issued with this record.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token_hash.is_some()
    }

    /// Returns `true` if the refresh secret has expired at `now`, or none
    /// was issued.
    #[must_use]
    pub fn is_refresh_expired_at(&self, now: OffsetDateTime) -> bool {
        self.refresh_token_expires_at
            .map(|exp| now > exp)
            .unwrap_or(true)
    }

    /// Returns `true` once neither secret can be used any more, which makes
    /// the record eligible for cleanup.
    #[must_use]
    pub fn is_fully_expired_at(&self, now: OffsetDateTime) -> bool {
        self.is_expired_at(now) && self.is_refresh_expired_at(now)
    }

    /// Seconds until the bearer secret expires, zero once expired.
    #[must_use]
    pub fn expires_in_at(&self, now: OffsetDateTime) -> u64 {
        u64::try_from((self.expires_at - now).whole_seconds()).unwrap_or(0)
    }

    /// Granted scopes joined with spaces.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Hash a token value using SHA-256.
    ///
    /// This is used both when storing new tokens and when looking up
    /// tokens for validation.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Generate a cryptographically secure random token.
    ///
    /// Returns a 256-bit random value encoded as base64url (43 characters).
    #[must_use]
    pub fn generate_token() -> String {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(now: OffsetDateTime) -> OAuthAccessToken {
        OAuthAccessToken {
            id: Uuid::new_v4(),
            identity: "u1".to_string(),
            token_hash: OAuthAccessToken::hash_token("bearer"),
            client_id: "c1".to_string(),
            grant_type: GrantType::AuthorizationCode,
            scopes: vec!["read".to_string(), "write".to_string()],
            created_at: now,
            expires_at: now + Duration::hours(1),
            refresh_token_hash: Some(OAuthAccessToken::hash_token("refresh")),
            refresh_token_expires_at: Some(now + Duration::days(30)),
            revoked: false,
            last_used_at: None,
            ip_address: Some("192.0.2.7".parse().unwrap()),
            user_agent: Some("curl/8".to_string()),
        }
    }

    #[test]
    fn test_hash_token() {
        let hash = OAuthAccessToken::hash_token("test-token-value");

        // SHA-256 produces 64 hex characters
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, OAuthAccessToken::hash_token("test-token-value"));
        assert_ne!(hash, OAuthAccessToken::hash_token("different-token"));
    }

    #[test]
    fn test_generate_token() {
        let token = OAuthAccessToken::generate_token();

        // 32 bytes base64url encoded = 43 characters
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_generate_token_uniqueness() {
        let mut tokens: Vec<String> = (0..100)
            .map(|_| OAuthAccessToken::generate_token())
            .collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_validity() {
        let now = OffsetDateTime::now_utc();
        let mut token = record(now);
        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + Duration::hours(2)));

        token.revoked = true;
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_refresh_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut token = record(now);
        assert!(!token.is_refresh_expired_at(now + Duration::days(29)));
        assert!(token.is_refresh_expired_at(now + Duration::days(31)));
        assert!(!token.is_fully_expired_at(now + Duration::days(2)));
        assert!(token.is_fully_expired_at(now + Duration::days(31)));

        token.refresh_token_hash = None;
        token.refresh_token_expires_at = None;
        assert!(token.is_refresh_expired_at(now));
        assert!(token.is_fully_expired_at(now + Duration::hours(2)));
    }

    #[test]
    fn test_expires_in() {
        let now = OffsetDateTime::now_utc();
        let token = record(now);
        assert_eq!(token.expires_in_at(now), 3600);
        assert_eq!(token.expires_in_at(now + Duration::minutes(10)), 3000);
        assert_eq!(token.expires_in_at(now + Duration::hours(3)), 0);
    }

    #[test]
    fn test_grant_type_round_trip() {
        for grant in [
            GrantType::AuthorizationCode,
            GrantType::ClientCredentials,
            GrantType::RefreshToken,
            GrantType::Password,
        ] {
            assert_eq!(grant.as_str().parse::<GrantType>().unwrap(), grant);
        }
        assert!("implicit".parse::<GrantType>().is_err());
    }

    #[test]
    fn test_serialization_never_contains_plaintext() {
        let token = record(OffsetDateTime::now_utc());
        let json = serde_json::to_value(&token).unwrap();

        assert_eq!(json["clientId"], "c1");
        assert_eq!(json["grantType"], "authorization_code");
        assert_eq!(json["ipAddress"], "192.0.2.7");
        assert!(!json.to_string().contains("\"bearer\""));

        let restored: OAuthAccessToken = serde_json::from_value(json).unwrap();
        assert_eq!(restored, token);
    }
}
