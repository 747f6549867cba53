//! Authentication — bearer-token verification capability.
//!
//! The service only needs to turn a presented token into a stable numeric
//! user id; how tokens are issued (OAuth, JWT signing, sessions) is someone
//! else's problem and stays behind the [`Authenticator`] seam. The API layer
//! rejects requests whose token does not verify with `401 Unauthorized`.

use std::collections::HashMap;
use std::pin::Pin;

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme comparison is case-insensitive per RFC 9110 §11.1; the token
/// itself is returned verbatim.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Capability that resolves a bearer token to a user id.
pub trait Authenticator: Send + Sync {
    /// Returns the user id the token belongs to, or `None` when the token
    /// is unknown, expired, or malformed.
    fn verify<'a>(&'a self, token: &'a str) -> Pin<Box<dyn Future<Output = Option<u64>> + Send + 'a>>;
}

/// Fixed token→user table; the demo and test backend.
///
/// A production deployment would implement [`Authenticator`] against its
/// identity provider instead.
#[derive(Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, u64>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that rejects everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a user id.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: u64) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn verify<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<u64>> + Send + 'a>> {
        Box::pin(async move { self.tokens.get(token).copied() })
    }
}
