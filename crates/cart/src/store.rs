//! Durable local key-value persistence.
//!
//! Backs the guest cart (and the stored credential) with one file per key
//! under the configured state directory. Writes go through a temp file and
//! rename so readers never observe a partial value.
//!
//! Key names are versioned schema constants. Earlier revisions of the app
//! churned between differently-named keys, so reads also probe the legacy
//! names once and migrate the value to the canonical key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, instrument, warn};

use nimzo_core::Cart;

use crate::error::CartError;

/// Canonical storage keys and their legacy aliases.
pub mod keys {
    /// JSON-serialized guest cart.
    pub const GUEST_CART: &str = "cart.guest.v1";

    /// Opaque session token.
    pub const CREDENTIAL: &str = "session.credential.v1";

    /// Names the guest cart lived under in earlier revisions.
    pub(super) const GUEST_CART_LEGACY: &[&str] = &["cart.guest", "guest-cart"];

    /// Names the token lived under in earlier revisions.
    pub(super) const CREDENTIAL_LEGACY: &[&str] = &["session.credential", "token"];
}

/// File-backed store for guest-session state.
///
/// All operations are best-effort reads and atomic writes; a missing or
/// unreadable value on load is treated as empty, never as an error.
#[derive(Debug, Clone)]
pub struct LocalCartStore {
    dir: PathBuf,
}

impl LocalCartStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    // =========================================================================
    // Guest cart
    // =========================================================================

    /// Load the guest cart.
    ///
    /// Returns an empty cart if nothing is stored or the stored value fails
    /// to parse. Parse failures are logged and the corrupt value is left in
    /// place for inspection.
    #[instrument(skip(self))]
    pub async fn load_cart(&self) -> Cart {
        let Some(raw) = self
            .read_key(keys::GUEST_CART, keys::GUEST_CART_LEGACY)
            .await
        else {
            return Cart::empty();
        };

        match serde_json::from_str(&raw) {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Stored guest cart is unreadable, starting empty");
                Cart::empty()
            }
        }
    }

    /// Persist the guest cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the value cannot be written.
    #[instrument(skip(self, cart))]
    pub async fn save_cart(&self, cart: &Cart) -> Result<(), CartError> {
        let json = serde_json::to_string(cart)?;
        self.write_key(keys::GUEST_CART, &json).await
    }

    /// Remove the stored guest cart. Removing an absent value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the file exists but cannot be removed.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        self.remove_key(keys::GUEST_CART).await?;
        for legacy in keys::GUEST_CART_LEGACY {
            self.remove_key(legacy).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Credential
    // =========================================================================

    /// Load the stored session token, if any. The value is returned raw;
    /// validity is the token gate's concern.
    #[instrument(skip(self))]
    pub async fn load_credential(&self) -> Option<String> {
        self.read_key(keys::CREDENTIAL, keys::CREDENTIAL_LEGACY)
            .await
    }

    /// Persist the session token.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the value cannot be written.
    #[instrument(skip_all)]
    pub async fn save_credential(&self, token: &str) -> Result<(), CartError> {
        self.write_key(keys::CREDENTIAL, token).await
    }

    /// Remove the stored session token.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the file exists but cannot be removed.
    #[instrument(skip(self))]
    pub async fn clear_credential(&self) -> Result<(), CartError> {
        self.remove_key(keys::CREDENTIAL).await?;
        for legacy in keys::CREDENTIAL_LEGACY {
            self.remove_key(legacy).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Key-value plumbing
    // =========================================================================

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read a key, falling back to legacy names. A value found under a
    /// legacy name is rewritten under the canonical key and the legacy file
    /// is removed, so the migration runs once.
    async fn read_key(&self, canonical: &str, legacy: &[&str]) -> Option<String> {
        if let Some(value) = read_file(&self.path_for(canonical)).await {
            return Some(value);
        }

        for name in legacy {
            let path = self.path_for(name);
            if let Some(value) = read_file(&path).await {
                debug!(from = %name, to = %canonical, "Migrating legacy storage key");
                if let Err(e) = self.write_key(canonical, &value).await {
                    warn!(error = %e, "Failed to rewrite legacy key under canonical name");
                }
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(error = %e, "Failed to remove legacy key file");
                }
                return Some(value);
            }
        }

        None
    }

    async fn write_key(&self, key: &str, value: &str) -> Result<(), CartError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_key(&self, key: &str) -> Result<(), CartError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(value) => Some(value),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read storage key");
            None
        }
    }
}
