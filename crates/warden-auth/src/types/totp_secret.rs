//! Per-user TOTP secret domain type.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Outcome of [`UserTotpSecret::reserve_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptReservation {
    /// The attempt was counted as a failure up front. The caller may check
    /// the code and clears the counter if it is right.
    Reserved {
        /// Failure counter including this attempt.
        attempts: u32,
    },

    /// The secret is locked and the code must not be checked.
    Locked {
        /// Time left before the lockout lifts.
        retry_after: Duration,
    },
}

/// Shared TOTP secret and backup codes of one user.
///
/// A secret only gates logins once it is both `enabled` and `confirmed`,
/// which happens together after the first successful verification.
/// Disabling two-factor authentication deletes the record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTotpSecret {
    /// Identifier of the owning user.
    pub identity: String,

    /// Base32-encoded shared secret.
    pub secret: String,

    /// Whether the secret gates logins.
    pub enabled: bool,

    /// Whether the user proved possession of the secret.
    pub confirmed: bool,

    /// Consecutive failed verifications.
    pub failed_attempts: u32,

    /// SHA-256 hashes of the unused backup codes.
    #[serde(default)]
    pub backup_code_hashes: Vec<String>,

    /// When the secret was provisioned.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Last successful verification.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_used_at: Option<OffsetDateTime>,

    /// Last failed verification.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_failed_at: Option<OffsetDateTime>,
}

impl UserTotpSecret {
    /// Creates a disabled, unconfirmed secret.
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
            enabled: false,
            confirmed: false,
            failed_attempts: 0,
            backup_code_hashes: Vec::new(),
            created_at: now,
            last_used_at: None,
            last_failed_at: None,
        }
    }

    /// Returns `true` if the secret gates logins.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.confirmed
    }

    /// Returns the time left before the lockout lifts, or `None` when the
    /// secret is not locked at `now`.
    ///
    /// A secret is locked once `failed_attempts` reaches `max_attempts`
    /// and stays locked for `window` after the last failure.
    #[must_use]
    pub fn lockout_remaining(
        &self,
        now: OffsetDateTime,
        max_attempts: u32,
        window: Duration,
    ) -> Option<Duration> {
        if self.failed_attempts < max_attempts {
            return None;
        }

        let Some(last_failed_at) = self.last_failed_at else {
            // Counter set without a timestamp: keep it locked for a full window.
            return Some(window);
        };

        let Some(unlocks_at) = last_failed_at.checked_add(window) else {
            return Some(window);
        };
        let remaining = unlocks_at - now;
        remaining.is_positive().then_some(remaining)
    }

    /// Claims one verification attempt.
    ///
    /// Refuses while locked. Otherwise clears a counter whose lockout
    /// window has passed, then counts the attempt as a failure and stamps
    /// `last_failed_at`. Storage runs this under the row lock so that no
    /// more than `max_attempts` codes are ever checked per window.
    #[must_use]
    pub fn reserve_attempt(
        &mut self,
        now: OffsetDateTime,
        max_attempts: u32,
        window: Duration,
    ) -> AttemptReservation {
        if let Some(retry_after) = self.lockout_remaining(now, max_attempts, window) {
            return AttemptReservation::Locked { retry_after };
        }

        if self.failed_attempts >= max_attempts {
            self.failed_attempts = 0;
        }
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_failed_at = Some(now);

        AttemptReservation::Reserved {
            attempts: self.failed_attempts,
        }
    }

    /// Number of backup codes left.
    #[must_use]
    pub fn remaining_backup_codes(&self) -> usize {
        self.backup_code_hashes.len()
    }
}

impl fmt::Debug for UserTotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserTotpSecret")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("confirmed", &self.confirmed)
            .field("failed_attempts", &self.failed_attempts)
            .field("backup_codes", &self.backup_code_hashes.len())
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("last_failed_at", &self.last_failed_at)
            .finish()
    }
}
