//! Engine error taxonomy.
//!
//! Guest-mode arithmetic cannot fail; everything here comes from the
//! remote API or the local store. Remote failures propagate to the caller
//! unchanged (no built-in retry); storage corruption on read is recovered
//! silently by the store and never surfaces as an error.

use thiserror::Error;

/// Errors surfaced by the cart engine.
#[derive(Debug, Error)]
pub enum CartError {
    /// A remote call was attempted without a valid credential, or the
    /// backend rejected the credential (401/403).
    #[error("authentication required")]
    AuthRequired,

    /// Transport-level failure reaching the remote cart API.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote cart API answered with a non-success status.
    #[error("remote cart API returned {0}")]
    RemoteStatus(reqwest::StatusCode),

    /// The remote response did not match the expected cart schema.
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// Local persistence could not be written.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A request URL could not be built from the configured base.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl CartError {
    /// Whether this error means the credential is no longer accepted.
    ///
    /// Callers that want an automatic logout on credential expiry can key
    /// off this; the reconciler itself never changes session mode on it.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CartError::AuthRequired.to_string(),
            "authentication required"
        );
        assert_eq!(
            CartError::RemoteStatus(reqwest::StatusCode::BAD_GATEWAY).to_string(),
            "remote cart API returned 502 Bad Gateway"
        );
    }

    #[test]
    fn test_is_auth() {
        assert!(CartError::AuthRequired.is_auth());
        assert!(!CartError::RemoteStatus(reqwest::StatusCode::INTERNAL_SERVER_ERROR).is_auth());
    }
}
