//! Authentication token model.
//!
//! A [`Token`] holds the state shared by every way of authenticating
//! (firewall, principal, role names, free-form attributes) and a closed
//! [`TokenKind`] with the fields specific to how the user authenticated.
//!
//! # Serialized form
//!
//! Tokens serialize to JSON. The schema is closed: the `kind.type` tag only
//! names the variants of [`TokenKind`] and unknown fields are rejected, so
//! decoding persisted state can never produce anything but a token. Use
//! [`crate::token::TokenReconstructor`] to decode untrusted bytes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Duration, OffsetDateTime};

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::principal::Principal;

/// Default lifetime of a [`TokenKind::TwoFactorPending`] token.
pub const PENDING_TOKEN_LIFETIME: Duration = Duration::seconds(600);

/// Longest lifetime a [`TokenKind::TwoFactorPending`] token may carry.
pub const MAX_PENDING_TOKEN_LIFETIME: Duration = Duration::days(1);

/// Returns `true` if `lifetime_secs` is a usable pending-token lifetime.
fn is_valid_pending_lifetime(lifetime_secs: i64) -> bool {
    (0..=MAX_PENDING_TOKEN_LIFETIME.whole_seconds()).contains(&lifetime_secs)
}

/// How the current user authenticated.
///
/// `Debug` output omits API keys, remember-me secrets and JWT claim values.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TokenKind {
    /// Username and password login.
    UsernamePassword,

    /// API key login. The presented key is kept for auditing.
    ApiKey {
        /// The key that was presented.
        key: String,
    },

    /// Bearer JWT login.
    Jwt {
        /// Decoded claim payload.
        claims: Map<String, Value>,
    },

    /// OAuth bearer login.
    #[serde(rename = "oauth")]
    OAuth {
        /// Scopes granted to the bearer token.
        scopes: Vec<String>,
    },

    /// Login restored from a long-lived remember-me cookie.
    RememberMe {
        /// Firewall secret the cookie was signed with.
        secret: String,
    },

    /// Impersonation of another user.
    SwitchUser {
        /// The token of the user doing the impersonation.
        original: Box<Token>,
    },

    /// Primary credentials verified, second factor still outstanding.
    TwoFactorPending {
        /// When the primary credentials were verified.
        #[serde(with = "time::serde::rfc3339")]
        created_at: OffsetDateTime,
        /// Seconds the token may wait for the second factor.
        lifetime_secs: i64,
    },
}

impl TokenKind {
    /// Returns the serialized tag of this variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::UsernamePassword => "username_password",
            Self::ApiKey { .. } => "api_key",
            Self::Jwt { .. } => "jwt",
            Self::OAuth { .. } => "oauth",
            Self::RememberMe { .. } => "remember_me",
            Self::SwitchUser { .. } => "switch_user",
            Self::TwoFactorPending { .. } => "two_factor_pending",
        }
    }
}

impl fmt::Debug for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePassword => f.write_str("UsernamePassword"),
            Self::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &"<redacted>").finish(),
            Self::Jwt { claims } => f
                .debug_struct("Jwt")
                .field("claims", &claims.keys().collect::<Vec<_>>())
                .finish(),
            Self::OAuth { scopes } => f.debug_struct("OAuth").field("scopes", scopes).finish(),
            Self::RememberMe { .. } => f
                .debug_struct("RememberMe")
                .field("secret", &"<redacted>")
                .finish(),
            Self::SwitchUser { original } => f
                .debug_struct("SwitchUser")
                .field("original", original)
                .finish(),
            Self::TwoFactorPending {
                created_at,
                lifetime_secs,
            } => f
                .debug_struct("TwoFactorPending")
                .field("created_at", created_at)
                .field("lifetime_secs", lifetime_secs)
                .finish(),
        }
    }
}

/// Current authentication state of a request or session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TokenState", into = "TokenState")]
pub struct Token {
    firewall: String,
    principal: Option<Principal>,
    role_names: Vec<String>,
    attributes: BTreeMap<String, Value>,
    kind: TokenKind,
}

/// Wire representation; validated into a [`Token`] on decode.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenState {
    firewall: String,
    #[serde(default)]
    principal: Option<Principal>,
    #[serde(default)]
    role_names: Vec<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    kind: TokenKind,
}

impl TryFrom<TokenState> for Token {
    type Error = AuthError;

    fn try_from(state: TokenState) -> Result<Self, Self::Error> {
        if let TokenKind::TwoFactorPending { lifetime_secs, .. } = state.kind
            && !is_valid_pending_lifetime(lifetime_secs)
        {
            return Err(AuthError::unexpected_token_type(format!(
                "two_factor_pending token with a lifetime of {lifetime_secs} seconds"
            )));
        }

        Token::build(state.firewall, state.principal, state.role_names, state.kind).map(
            |mut token| {
                token.attributes = state.attributes;
                token
            },
        )
    }
}

impl From<Token> for TokenState {
    fn from(token: Token) -> Self {
        Self {
            firewall: token.firewall,
            principal: token.principal,
            role_names: token.role_names,
            attributes: token.attributes,
            kind: token.kind,
        }
    }
}

impl Token {
    fn build(
        firewall: String,
        principal: Option<Principal>,
        role_names: Vec<String>,
        kind: TokenKind,
    ) -> AuthResult<Self> {
        if firewall.is_empty() {
            return Err(AuthError::EmptyFirewallName);
        }

        Ok(Self {
            firewall,
            principal,
            role_names,
            attributes: BTreeMap::new(),
            kind,
        })
    }

    /// Creates a token for a username/password login.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn username_password(
        principal: Principal,
        firewall: impl Into<String>,
        roles: Vec<String>,
    ) -> AuthResult<Self> {
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::UsernamePassword,
        )
    }

    /// Creates a token for an API key login.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn api_key(
        principal: Principal,
        firewall: impl Into<String>,
        key: impl Into<String>,
        roles: Vec<String>,
    ) -> AuthResult<Self> {
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::ApiKey { key: key.into() },
        )
    }

    /// Creates a token for a JWT bearer login.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn jwt(
        principal: Principal,
        firewall: impl Into<String>,
        claims: Map<String, Value>,
        roles: Vec<String>,
    ) -> AuthResult<Self> {
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::Jwt { claims },
        )
    }

    /// Creates a token for an OAuth bearer login.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn oauth(
        principal: Principal,
        firewall: impl Into<String>,
        scopes: Vec<String>,
        roles: Vec<String>,
    ) -> AuthResult<Self> {
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::OAuth { scopes },
        )
    }

    /// Creates a token for a remember-me login. Roles come from the principal.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty and
    /// `InvalidSecret` if `secret` is empty.
    pub fn remember_me(
        principal: Principal,
        firewall: impl Into<String>,
        secret: impl Into<String>,
    ) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::invalid_secret(
                "remember-me secret must not be empty",
            ));
        }
        let roles = principal.roles().to_vec();
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::RememberMe { secret },
        )
    }

    /// Creates an impersonation token wrapping the impersonator's token.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn switch_user(
        principal: Principal,
        firewall: impl Into<String>,
        roles: Vec<String>,
        original: Token,
    ) -> AuthResult<Self> {
        Self::build(
            firewall.into(),
            Some(principal),
            roles,
            TokenKind::SwitchUser {
                original: Box::new(original),
            },
        )
    }

    /// Creates a partially authenticated token awaiting a second factor.
    ///
    /// Pending tokens carry no role names.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty, or `Configuration`
    /// if `lifetime` is negative or above [`MAX_PENDING_TOKEN_LIFETIME`].
    pub fn two_factor_pending(
        principal: Principal,
        firewall: impl Into<String>,
        created_at: OffsetDateTime,
        lifetime: Duration,
    ) -> AuthResult<Self> {
        if !is_valid_pending_lifetime(lifetime.whole_seconds()) {
            return Err(AuthError::configuration(format!(
                "pending token lifetime must be between 0 and {} seconds",
                MAX_PENDING_TOKEN_LIFETIME.whole_seconds()
            )));
        }

        Self::build(
            firewall.into(),
            Some(principal),
            Vec::new(),
            TokenKind::TwoFactorPending {
                created_at,
                lifetime_secs: lifetime.whole_seconds(),
            },
        )
    }

    /// Returns the user identifier, or `""` before a principal is attached.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.principal
            .as_ref()
            .map(Principal::identifier)
            .unwrap_or("")
    }

    /// Returns the authenticated principal.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Replaces the principal, e.g. after reloading the user.
    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }

    /// Returns the firewall this token was issued under.
    #[must_use]
    pub fn firewall(&self) -> &str {
        &self.firewall
    }

    /// Returns the granted role names in insertion order.
    #[must_use]
    pub fn role_names(&self) -> &[String] {
        &self.role_names
    }

    /// Returns the variant-specific state.
    #[must_use]
    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    /// Erases credential material from the principal (and from the
    /// impersonator's token). Idempotent.
    pub fn erase_credentials(&mut self) {
        if let Some(principal) = self.principal.as_mut() {
            principal.erase_credentials();
        }
        if let TokenKind::SwitchUser { original } = &mut self.kind {
            original.erase_credentials();
        }
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Replaces all attributes.
    pub fn set_attributes(&mut self, attributes: BTreeMap<String, Value>) {
        self.attributes = attributes;
    }

    /// Returns `true` if the attribute has been set, even to `null`.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// Returns `AttributeNotFound` if the attribute was never set. An
    /// attribute set to `null` is returned as [`Value::Null`].
    pub fn attribute(&self, name: &str) -> AuthResult<&Value> {
        self.attributes
            .get(name)
            .ok_or_else(|| AuthError::attribute_not_found(name))
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Returns `true` once a principal is attached and no factor is pending.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some() && !matches!(self.kind, TokenKind::TwoFactorPending { .. })
    }

    /// Returns `true` if the user proved their credentials in this session.
    ///
    /// Remember-me logins are authenticated but not fully authenticated,
    /// so sensitive actions can require a fresh login.
    #[must_use]
    pub fn is_fully_authenticated(&self) -> bool {
        self.is_authenticated() && !matches!(self.kind, TokenKind::RememberMe { .. })
    }

    /// Returns `true` for impersonation tokens.
    #[must_use]
    pub fn is_impersonating(&self) -> bool {
        matches!(self.kind, TokenKind::SwitchUser { .. })
    }

    /// Returns the impersonator's token, used to exit impersonation.
    #[must_use]
    pub fn original_token(&self) -> Option<&Token> {
        match &self.kind {
            TokenKind::SwitchUser { original } => Some(original),
            _ => None,
        }
    }

    /// Returns the OAuth scopes, empty for other variants.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        match &self.kind {
            TokenKind::OAuth { scopes } => scopes,
            _ => &[],
        }
    }

    /// Returns when a pending token stops being promotable.
    ///
    /// `None` for other variants, and for a pending token whose expiry
    /// falls outside the representable date range.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        match self.kind {
            TokenKind::TwoFactorPending {
                created_at,
                lifetime_secs,
            } => created_at.checked_add(Duration::seconds(lifetime_secs)),
            _ => None,
        }
    }

    /// Returns `true` if this is a pending token older than its lifetime.
    /// Other variants never expire.
    ///
    /// A pending token whose expiry cannot be computed counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.kind {
            TokenKind::TwoFactorPending { .. } => self
                .expires_at()
                .is_none_or(|expires_at| now > expires_at),
            _ => false,
        }
    }

    /// Returns `true` if this is a pending token older than its lifetime.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Serializes the token for a session store.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if serialization fails.
    pub fn to_bytes(&self) -> AuthResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AuthError::internal(format!("Failed to serialize token: {}", e)))
    }
}
