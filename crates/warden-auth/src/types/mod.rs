//! Persisted domain types.

pub mod oauth_token;
pub mod totp_secret;

pub use oauth_token::{GrantType, OAuthAccessToken, RequestMeta};
pub use totp_secret::{AttemptReservation, UserTotpSecret};
