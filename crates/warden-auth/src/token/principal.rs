//! The authenticated principal carried by a token.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An authenticated user as seen by the token model.
///
/// The engine only reads the identifier and the granted role names. Any
/// credential material attached by the authenticator (for example the
/// password hash that was checked) is transient: it is never serialized and
/// is dropped by [`Principal::erase_credentials`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Principal {
    /// Stable user identifier (username, email or id).
    identifier: String,

    /// Role names granted directly to the user.
    #[serde(default)]
    roles: Vec<String>,

    /// Email address, used as the authenticator app label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,

    #[serde(skip)]
    credentials: Option<String>,
}

impl Principal {
    /// Creates a principal with the given identifier and roles.
    #[must_use]
    pub fn new<I, R>(identifier: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            email: None,
            credentials: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attaches credential material that must not outlive authentication.
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the role names granted to the user.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns the email address, if known.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the attached credential material, if not yet erased.
    #[must_use]
    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    /// Drops credential material. Calling it again is a no-op.
    pub fn erase_credentials(&mut self) {
        self.credentials = None;
    }

    /// Label used for authenticator app enrollment.
    #[must_use]
    pub fn otp_label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.identifier)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("identifier", &self.identifier)
            .field("roles", &self.roles)
            .field("email", &self.email)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
