//! OAuth 2.1 bearer and refresh token lifecycle.
//!
//! - [`service`] - issuing, validating, rotating and revoking token pairs
//! - [`response`] - plaintext secrets and the token endpoint response body

pub mod response;
pub mod service;

pub use response::{IssuedToken, TokenResponse};
pub use service::{IssueRequest, OAuthTokenService};
