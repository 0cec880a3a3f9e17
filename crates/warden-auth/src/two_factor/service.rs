//! TOTP enrollment, verification and backup codes.
//!
//! # Enrollment
//!
//! 1. [`TwoFactorService::generate_secret`] stores a disabled, unconfirmed
//!    secret and [`TwoFactorService::provisioning_uri`] renders it for an
//!    authenticator app.
//! 2. [`TwoFactorService::enable_two_factor`] checks the first code, turns
//!    the secret on and returns the backup codes once.
//!
//! # Login
//!
//! After the first factor succeeds, [`TwoFactorService::begin_login`]
//! issues a partial token. [`TwoFactorService::complete_login`] trades it
//! for a fully authenticated token when the second factor checks out.
//!
//! # Lockout
//!
//! TOTP codes and backup codes share one failure counter. Each check first
//! reserves an attempt in storage, so at most `max_failed_attempts` codes
//! are ever evaluated per lockout window, however many requests race.
//! Once the limit is reached every verification fails with
//! [`AuthError::TwoFactorLocked`], even for a correct code, until
//! `lockout_duration` has passed since the last failure.

use std::sync::Arc;

use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::AuthResult;
use crate::config::TwoFactorConfig;
use crate::error::AuthError;
use crate::storage::TotpSecretStorage;
use crate::token::{Principal, Token, TokenKind};
use crate::two_factor::backup_codes::{self, BackupCodeBatch};
use crate::types::{AttemptReservation, UserTotpSecret};

/// Account name used when a TOTP instance only checks codes.
const VERIFY_LABEL: &str = "verify";

/// The second factor presented to finish a login.
#[derive(Debug, Clone, Copy)]
pub enum SecondFactor<'a> {
    /// A code from the authenticator app.
    Totp(&'a str),

    /// One of the printed backup codes.
    BackupCode(&'a str),
}

/// Service managing per-user TOTP secrets.
pub struct TwoFactorService {
    storage: Arc<dyn TotpSecretStorage>,
    config: TwoFactorConfig,
}

impl TwoFactorService {
    /// Creates a new two-factor service.
    #[must_use]
    pub fn new(storage: Arc<dyn TotpSecretStorage>, config: TwoFactorConfig) -> Self {
        Self { storage, config }
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &TwoFactorConfig {
        &self.config
    }

    /// Provisions a fresh shared secret, replacing any unconfirmed one.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorAlreadyEnabled` if the user already has an enabled
    /// secret, or a storage error.
    pub async fn generate_secret(&self, identity: &str) -> AuthResult<UserTotpSecret> {
        self.generate_secret_at(identity, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::generate_secret`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorAlreadyEnabled` if the user already has an enabled
    /// secret, or a storage error.
    pub async fn generate_secret_at(
        &self,
        identity: &str,
        now: OffsetDateTime,
    ) -> AuthResult<UserTotpSecret> {
        if let Some(existing) = self.storage.find_by_identity(identity).await?
            && existing.enabled
        {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let Secret::Encoded(encoded) = Secret::generate_secret().to_encoded() else {
            return Err(AuthError::internal("TOTP secret could not be encoded"));
        };

        let secret = UserTotpSecret::new(identity, encoded, now);
        self.storage.save(&secret).await?;

        tracing::debug!(identity = %identity, "Provisioned TOTP secret");
        Ok(secret)
    }

    /// Returns the `otpauth://totp/...` URI for enrolling `secret` in an
    /// authenticator app, labelled with the principal's email when known.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSecret` if the secret cannot be decoded or the label
    /// contains `:`.
    pub fn provisioning_uri(
        &self,
        secret: &UserTotpSecret,
        principal: &Principal,
    ) -> AuthResult<String> {
        let totp = self.build_totp(&secret.secret, principal.otp_label())?;
        Ok(totp.get_url())
    }

    /// Checks a code from the authenticator app.
    ///
    /// Returns `false` for a wrong code or an unknown user.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorLocked` while the user is locked out, `InvalidSecret`
    /// if the stored secret is corrupt, or a storage error.
    pub async fn verify_code(&self, identity: &str, code: &str) -> AuthResult<bool> {
        self.verify_code_at(identity, code, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::verify_code`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorLocked` while the user is locked out, `InvalidSecret`
    /// if the stored secret is corrupt, or a storage error.
    pub async fn verify_code_at(
        &self,
        identity: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        let Some(secret) = self.storage.find_by_identity(identity).await? else {
            tracing::debug!(identity = %identity, "No TOTP secret for user");
            return Ok(false);
        };

        let totp = self.build_totp(&secret.secret, VERIFY_LABEL)?;
        let attempts = self.reserve_attempt(identity, now).await?;

        if totp.check(code.trim(), unix_seconds(now)) {
            self.storage.record_success(identity, now).await?;
            tracing::debug!(identity = %identity, "TOTP code accepted");
            return Ok(true);
        }

        self.log_rejection(identity, attempts, "TOTP code rejected");
        Ok(false)
    }

    /// Confirms the secret with a first code and turns two-factor
    /// authentication on.
    ///
    /// Returns the plaintext backup codes, which cannot be retrieved again,
    /// or `None` if the code is wrong or no secret was provisioned.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorAlreadyEnabled` if it is already on,
    /// `TwoFactorLocked` while locked out, or a storage error.
    pub async fn enable_two_factor(
        &self,
        identity: &str,
        code: &str,
    ) -> AuthResult<Option<Vec<String>>> {
        self.enable_two_factor_at(identity, code, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::enable_two_factor`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorAlreadyEnabled` if it is already on,
    /// `TwoFactorLocked` while locked out, or a storage error.
    pub async fn enable_two_factor_at(
        &self,
        identity: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<Vec<String>>> {
        match self.storage.find_by_identity(identity).await? {
            Some(secret) if secret.enabled => return Err(AuthError::TwoFactorAlreadyEnabled),
            Some(_) => {}
            None => return Ok(None),
        }

        if !self.verify_code_at(identity, code, now).await? {
            return Ok(None);
        }

        let batch = BackupCodeBatch::generate(self.config.backup_code_count);
        if !self.storage.enable(identity, &batch.hashes).await? {
            // A concurrent enrollment or disable got there first.
            return match self.storage.find_by_identity(identity).await? {
                Some(secret) if secret.enabled => Err(AuthError::TwoFactorAlreadyEnabled),
                _ => Ok(None),
            };
        }

        tracing::info!(identity = %identity, "Two-factor authentication enabled");
        Ok(Some(batch.codes))
    }

    /// Checks a backup code and spends it.
    ///
    /// Returns `false` if the code is unknown, already used or two-factor
    /// authentication is off. Wrong codes count towards the lockout.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorLocked` while locked out, or a storage error.
    pub async fn verify_backup_code(&self, identity: &str, code: &str) -> AuthResult<bool> {
        self.verify_backup_code_at(identity, code, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::verify_backup_code`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorLocked` while locked out, or a storage error.
    pub async fn verify_backup_code_at(
        &self,
        identity: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AuthResult<bool> {
        if !backup_codes::is_well_formed(code) {
            tracing::debug!(identity = %identity, "Malformed backup code");
            return Ok(false);
        }

        if !self.storage.is_enabled_for_identity(identity).await? {
            tracing::debug!(identity = %identity, "Backup code presented without 2FA");
            return Ok(false);
        }

        let attempts = self.reserve_attempt(identity, now).await?;

        let code_hash = backup_codes::hash_backup_code(code);
        if !self.storage.consume_backup_code(identity, &code_hash).await? {
            self.log_rejection(identity, attempts, "Backup code rejected");
            return Ok(false);
        }

        self.storage.record_success(identity, now).await?;
        tracing::info!(identity = %identity, "Backup code consumed");
        Ok(true)
    }

    /// Replaces all backup codes and returns the new plaintext codes once.
    ///
    /// # Errors
    ///
    /// Returns `TwoFactorNotEnabled` if two-factor authentication is off,
    /// or a storage error.
    pub async fn regenerate_backup_codes(&self, identity: &str) -> AuthResult<Vec<String>> {
        let batch = BackupCodeBatch::generate(self.config.backup_code_count);
        if !self
            .storage
            .replace_backup_codes(identity, &batch.hashes)
            .await?
        {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        tracing::info!(identity = %identity, "Backup codes regenerated");
        Ok(batch.codes)
    }

    /// Turns two-factor authentication off by deleting the secret.
    ///
    /// Returns `true` if a secret existed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn disable_two_factor(&self, identity: &str) -> AuthResult<bool> {
        let deleted = self.storage.delete(identity).await?;
        if deleted {
            tracing::info!(identity = %identity, "Two-factor authentication disabled");
        }
        Ok(deleted)
    }

    /// Returns `true` if logins of this user require a second factor.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn is_two_factor_enabled(&self, identity: &str) -> AuthResult<bool> {
        self.storage.is_enabled_for_identity(identity).await
    }

    /// Issues a partial token once the first factor has been checked.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn begin_login(&self, principal: Principal, firewall: &str) -> AuthResult<Token> {
        self.begin_login_at(principal, firewall, OffsetDateTime::now_utc())
    }

    /// [`Self::begin_login`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFirewallName` if `firewall` is empty.
    pub fn begin_login_at(
        &self,
        principal: Principal,
        firewall: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Token> {
        Token::two_factor_pending(principal, firewall, now, self.config.pending_token_ttl())
    }

    /// Trades a pending token for a fully authenticated one.
    ///
    /// The new token keeps the firewall, principal and attributes of the
    /// pending token and grants the principal's roles. Returns `None` if the
    /// pending token expired or the second factor is wrong.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedTokenType` if `pending` is not a pending token,
    /// `TwoFactorNotEnabled` if the user has no active secret,
    /// `TwoFactorLocked` while locked out, or a storage error.
    pub async fn complete_login(
        &self,
        pending: &Token,
        factor: SecondFactor<'_>,
    ) -> AuthResult<Option<Token>> {
        self.complete_login_at(pending, factor, OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::complete_login`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedTokenType` if `pending` is not a pending token,
    /// `TwoFactorNotEnabled` if the user has no active secret,
    /// `TwoFactorLocked` while locked out, or a storage error.
    pub async fn complete_login_at(
        &self,
        pending: &Token,
        factor: SecondFactor<'_>,
        now: OffsetDateTime,
    ) -> AuthResult<Option<Token>> {
        if !matches!(pending.kind(), TokenKind::TwoFactorPending { .. }) {
            return Err(AuthError::unexpected_token_type(format!(
                "token of kind \"{}\"",
                pending.kind().name()
            )));
        }

        let Some(principal) = pending.principal() else {
            return Err(AuthError::unexpected_token_type(
                "pending token without principal",
            ));
        };

        if pending.is_expired_at(now) {
            tracing::debug!(identity = %principal.identifier(), "Pending login expired");
            return Ok(None);
        }

        let identity = principal.identifier();
        if !self.storage.is_enabled_for_identity(identity).await? {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let accepted = match factor {
            SecondFactor::Totp(code) => self.verify_code_at(identity, code, now).await?,
            SecondFactor::BackupCode(code) => {
                self.verify_backup_code_at(identity, code, now).await?
            }
        };
        if !accepted {
            return Ok(None);
        }

        let mut token = Token::username_password(
            principal.clone(),
            pending.firewall(),
            principal.roles().to_vec(),
        )?;
        token.set_attributes(pending.attributes().clone());

        tracing::info!(
            identity = %identity,
            firewall = %pending.firewall(),
            "Second factor accepted, login completed"
        );
        Ok(Some(token))
    }

    /// Counts one attempt against the lockout before a code is checked and
    /// returns the failure counter including it.
    async fn reserve_attempt(&self, identity: &str, now: OffsetDateTime) -> AuthResult<u32> {
        let reservation = self
            .storage
            .reserve_attempt(
                identity,
                now,
                self.config.max_failed_attempts,
                self.config.lockout_ttl(),
            )
            .await?;

        match reservation {
            AttemptReservation::Reserved { attempts } => Ok(attempts),
            AttemptReservation::Locked { retry_after } => {
                let retry_after_secs = u64::try_from(retry_after.whole_seconds())
                    .unwrap_or(0)
                    .max(1);
                tracing::debug!(
                    identity = %identity,
                    retry_after_secs,
                    "Second factor refused during lockout"
                );
                Err(AuthError::two_factor_locked(retry_after_secs))
            }
        }
    }

    fn log_rejection(&self, identity: &str, attempts: u32, message: &'static str) {
        if attempts >= self.config.max_failed_attempts {
            tracing::warn!(
                identity = %identity,
                attempts,
                "Second factor locked after repeated failures"
            );
        } else {
            tracing::debug!(identity = %identity, attempts, "{}", message);
        }
    }

    fn build_totp(&self, secret: &str, label: &str) -> AuthResult<TOTP> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| AuthError::invalid_secret(format!("{e:?}")))?;

        TOTP::new(
            Algorithm::SHA1,
            self.config.digits,
            self.config.skew,
            self.config.step.as_secs(),
            secret_bytes,
            Some(self.config.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| AuthError::invalid_secret(e.to_string()))
    }
}

fn unix_seconds(now: OffsetDateTime) -> u64 {
    u64::try_from(now.unix_timestamp()).unwrap_or(0)
}
