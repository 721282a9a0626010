//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `NIMZO_BACKEND_URL` - Base URL of the remote cart API
//!   (e.g., <https://nimzo-backend.onrender.com>)
//!
//! ## Optional
//! - `NIMZO_STATE_DIR` - Directory for durable local state
//!   (default: `./nimzo-state`)

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Base URL of the remote cart API.
    pub backend_url: Url,
    /// Directory for the local key-value store (guest cart, credential).
    pub state_dir: PathBuf,
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend_url = get_required_env("NIMZO_BACKEND_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("NIMZO_BACKEND_URL".to_string(), e.to_string())
            })?;
        let state_dir = PathBuf::from(get_env_or_default("NIMZO_STATE_DIR", "./nimzo-state"));

        Ok(Self {
            backend_url,
            state_dir,
        })
    }

    /// Build a configuration directly, bypassing the environment.
    #[must_use]
    pub const fn new(backend_url: Url, state_dir: PathBuf) -> Self {
        Self {
            backend_url,
            state_dir,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_env() {
        let result = get_required_env("NIMZO_TEST_DOES_NOT_EXIST");
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_env_default_applies() {
        let value = get_env_or_default("NIMZO_TEST_DOES_NOT_EXIST", "fallback");
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_direct_construction() {
        let config = CartConfig::new(
            "https://api.example.com".parse().unwrap(),
            PathBuf::from("/tmp/state"),
        );
        assert_eq!(config.backend_url.as_str(), "https://api.example.com/");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
    }
}
