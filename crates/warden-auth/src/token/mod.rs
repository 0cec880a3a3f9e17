//! Authentication tokens.
//!
//! - [`model`] - the [`Token`] sum type and its variants
//! - [`principal`] - the authenticated user carried by a token
//! - [`reconstruct`] - decoding tokens from untrusted session state

pub mod model;
pub mod principal;
pub mod reconstruct;

pub use model::{MAX_PENDING_TOKEN_LIFETIME, PENDING_TOKEN_LIFETIME, Token, TokenKind};
pub use principal::Principal;
pub use reconstruct::TokenReconstructor;
