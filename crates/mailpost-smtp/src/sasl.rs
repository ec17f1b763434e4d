//! SASL payload encoders used by `AUTH`.
//!
//! Implements:
//! - PLAIN (RFC 4616) - Basic username/password authentication
//! - LOGIN (draft-murchison-sasl-login) - Username and password as separate challenges
//! - OAUTHBEARER (RFC 7628) - Standard `OAuth2` authentication
//! - XOAUTH2 (Google/Microsoft proprietary) - Legacy `OAuth2` authentication

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
///
/// # Example
///
/// ```
/// use mailpost_smtp::sasl::plain_response;
///
/// let response = plain_response("testuser", "testpass");
/// assert_eq!(response, "AHRlc3R1c2VyAHRlc3RwYXNz");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    // The first NUL is the (empty) authorization identity.
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Encodes one LOGIN challenge answer (the username or the password).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Generates OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response (Google/Microsoft proprietary).
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Decodes the base64 JSON error a server sends as a `334` challenge when a
/// bearer token is rejected.
///
/// Returns `None` if the challenge is not a well-formed `OAuth2` error.
#[must_use]
pub fn parse_oauth_challenge(challenge: &str) -> Option<OAuthError> {
    let decoded = STANDARD.decode(challenge.trim()).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// `OAuth2` error response from server.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP status code.
    pub status: String,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: String,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(scope) = &self.scope {
            write!(f, ", scope {scope}")?;
        }
        Ok(())
    }
}
