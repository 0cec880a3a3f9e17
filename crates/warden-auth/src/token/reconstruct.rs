//! Rebuilding tokens from persisted session state.
//!
//! Session rows and cookies are untrusted input. Bytes are decoded in two
//! steps: first into a generic JSON value, then into the closed [`Token`]
//! schema. The outcome depends on which step fails:
//!
//! | Input                                   | Result                        |
//! |-----------------------------------------|-------------------------------|
//! | not JSON at all, or JSON `null`         | `Ok(None)`                    |
//! | JSON that decodes into a [`Token`]      | `Ok(Some(token))`             |
//! | any other JSON value                    | `Err(UnexpectedTokenType)`    |
//!
//! Garbage is a benign parse failure; well-formed data that is not a token is
//! treated as a spoofing attempt and always reported.

use serde_json::Value;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::model::Token;

/// Decodes tokens from session storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenReconstructor;

impl TokenReconstructor {
    /// Creates a reconstructor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rebuilds a token from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedTokenType` when the bytes are valid JSON that does
    /// not describe a token.
    pub fn create(&self, bytes: &[u8]) -> AuthResult<Option<Token>> {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, len = bytes.len(), "Discarding unreadable token state");
                return Ok(None);
            }
        };

        if value.is_null() {
            return Ok(None);
        }

        let found = describe(&value);
        match serde_json::from_value::<Token>(value) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(found = %found, error = %e, "Rejected persisted token state");
                Err(AuthError::unexpected_token_type(found))
            }
        }
    }
}

/// Short description of a decoded value, safe to log.
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(map) => match map
            .get("kind")
            .and_then(|kind| kind.get("type"))
            .and_then(Value::as_str)
        {
            Some(tag) => format!("object of kind \"{}\"", truncate(tag)),
            None => "object".to_string(),
        },
    }
}

fn truncate(tag: &str) -> &str {
    match tag.char_indices().nth(64) {
        Some((idx, _)) => &tag[..idx],
        None => tag,
    }
}
