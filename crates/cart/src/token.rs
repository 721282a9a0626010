//! Credential validation and the validated `Credential` wrapper.
//!
//! The authentication collaborator owns issuing tokens; this module only
//! decides whether a stored value is usable. Persistence round-trips
//! through browser-style storage have historically produced the literal
//! strings `"undefined"` and `"null"`, so those are rejected alongside
//! missing and empty values.

use secrecy::{ExposeSecret, SecretString};

/// Literal values that indicate a corrupted persistence round-trip rather
/// than a real token.
const CORRUPTED_VALUES: &[&str] = &["undefined", "null"];

/// Whether a raw stored value is a usable credential.
///
/// Pure function, no I/O. `None`, empty strings, and the corrupted-value
/// literals all classify as invalid identically.
#[must_use]
pub fn is_valid(raw: Option<&str>) -> bool {
    match raw {
        None => false,
        Some(value) => !value.is_empty() && !CORRUPTED_VALUES.contains(&value),
    }
}

/// A validated bearer credential.
///
/// Construction goes through [`Credential::new`], so holding one proves the
/// token passed the gate. The inner value is kept in a `SecretString` and
/// redacted from `Debug` output.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw token, returning `None` if it fails validation.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        is_valid(Some(raw)).then(|| Self(SecretString::from(raw.to_string())))
    }

    /// The bearer value, for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}
