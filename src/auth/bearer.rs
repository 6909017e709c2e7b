//! Bearer value classification
//!
//! A bearer value presented to `/v2` is one of two things: a token this shim
//! issued for an anonymous client, or a Basic credential that the token
//! endpoint echoed back. Verification decides which.

use tracing::debug;

use super::token::TokenForge;

/// Outcome of classifying a bearer value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerCredential {
    /// A valid token issued by this shim
    Anonymous,

    /// Anything else, to be forwarded upstream as a Basic credential
    Credential(String),
}

/// Classify a non-empty, trimmed bearer value
///
/// Verification failures are expected for every credentialed client, so
/// they are logged at debug level and never surfaced as errors.
pub fn classify_bearer(forge: &TokenForge, secret: &[u8], value: &str) -> BearerCredential {
    match forge.verify(secret, value) {
        Ok(()) => BearerCredential::Anonymous,
        Err(e) => {
            debug!(reason = %e, "Bearer value is not an anonymous token");
            BearerCredential::Credential(value.to_string())
        }
    }
}
