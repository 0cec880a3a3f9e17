//! Newly issued tokens and their wire representation.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::OAuthAccessToken;

/// A freshly created token record together with its plaintext secrets.
///
/// The plaintext values exist only here. They are handed to the client once
/// and cannot be recovered from the stored record afterwards.
#[derive(Clone)]
pub struct IssuedToken {
    /// The persisted record.
    pub record: OAuthAccessToken,

    /// Plaintext bearer secret.
    pub access_token: String,

    /// Plaintext refresh secret, if one was issued.
    pub refresh_token: Option<String>,
}

impl IssuedToken {
    /// Builds the token endpoint response.
    #[must_use]
    pub fn to_response(&self) -> TokenResponse {
        self.to_response_at(OffsetDateTime::now_utc())
    }

    /// Builds the token endpoint response with `expires_in` relative to `now`.
    #[must_use]
    pub fn to_response_at(&self, now: OffsetDateTime) -> TokenResponse {
        let mut response = TokenResponse::new(
            self.access_token.clone(),
            self.record.expires_in_at(now),
            self.record.scope_string(),
        );
        if let Some(ref refresh_token) = self.refresh_token {
            response = response.with_refresh_token(refresh_token.clone());
        }
        response
    }
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("record", &self.record)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "q8J3...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "read write",
///   "refresh_token": "Zk1a..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The bearer secret.
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Seconds until the access token expires.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh secret, omitted when none was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a new token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}
