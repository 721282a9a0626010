//! Session state machine and cart ownership.
//!
//! The reconciler owns the single in-memory cart snapshot and decides
//! which store is authoritative for it:
//!
//! - `Guest` - the local store; mutations are pure arithmetic, persisted
//!   after every change.
//! - `Syncing` - transient, while a guest cart is being merged into the
//!   remote cart at login.
//! - `Authenticated` - the remote backend; mutations go over the wire and
//!   are followed by exactly one fetch of the canonical cart.
//!
//! Subscribers receive complete snapshots over a `watch` channel; partial
//! writes are never visible. Every mutate+fetch pair (and every session
//! transition) runs under one operation mutex, so concurrent calls
//! serialize in issue order rather than racing at the fetch step. A fetch
//! whose operation started before a session transition is discarded via a
//! generation check instead of overwriting the newer state.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use nimzo_core::{Cart, ProductId, ProductSnapshot};

use crate::error::CartError;
use crate::remote::RemoteCart;
use crate::store::LocalCartStore;
use crate::token::{self, Credential};

/// Which store currently owns the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Unauthenticated; the local store is authoritative.
    Guest,
    /// Login-time merge in progress.
    Syncing,
    /// The remote backend is authoritative.
    Authenticated,
}

/// Authentication state as reported by the auth collaborator.
///
/// Implements `Debug` manually to redact the raw token.
#[derive(Clone, Default)]
pub struct AuthSnapshot {
    /// The raw stored token, if any. Validity is decided here, not by the
    /// collaborator.
    pub credential: Option<String>,
    /// Whether the collaborator considers the session authenticated.
    pub is_authenticated: bool,
    /// True while the collaborator is still restoring its state; all
    /// transitions are deferred until it settles.
    pub loading: bool,
}

impl std::fmt::Debug for AuthSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSnapshot")
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("is_authenticated", &self.is_authenticated)
            .field("loading", &self.loading)
            .finish()
    }
}

/// Outcome of the login-time merge.
///
/// Per-item failures do not abort the merge; they are collected here so
/// the caller can surface them instead of finding items silently missing.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Products transferred into the remote cart.
    pub succeeded: Vec<ProductId>,
    /// Products that could not be transferred, with the error for each.
    pub failed: Vec<(ProductId, CartError)>,
}

impl MergeReport {
    /// Whether every guest item made it into the remote cart.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct State {
    mode: SessionMode,
    credential: Option<Credential>,
    /// Bumped on every session transition; an operation whose captured
    /// generation no longer matches commits nothing.
    generation: u64,
}

struct Inner {
    store: LocalCartStore,
    remote: Arc<dyn RemoteCart>,
    /// Serializes mutate+fetch pairs and session transitions.
    ops: tokio::sync::Mutex<()>,
    state: Mutex<State>,
    publisher: watch::Sender<Cart>,
}

/// The cart state reconciliation engine.
///
/// Cheaply cloneable; clones share the same cart, state machine, and
/// operation queue.
#[derive(Clone)]
pub struct CartReconciler {
    inner: Arc<Inner>,
}

impl CartReconciler {
    /// Create a reconciler in guest mode with an empty cart. Call
    /// [`start`](Self::start) to restore persisted state.
    #[must_use]
    pub fn new(store: LocalCartStore, remote: Arc<dyn RemoteCart>) -> Self {
        let (publisher, _) = watch::channel(Cart::empty());
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                ops: tokio::sync::Mutex::new(()),
                state: Mutex::new(State {
                    mode: SessionMode::Guest,
                    credential: None,
                    generation: 0,
                }),
                publisher,
            }),
        }
    }

    /// Restore state at process start.
    ///
    /// A valid stored credential starts the session authenticated and
    /// replaces the cart with the canonical fetch; otherwise the guest cart
    /// is restored from the local store.
    ///
    /// # Errors
    ///
    /// Propagates the initial fetch failure when starting authenticated.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), CartError> {
        let _guard = self.inner.ops.lock().await;

        let stored = self.inner.store.load_credential().await;
        if token::is_valid(stored.as_deref()) {
            // Validity was just checked; new() cannot fail here.
            let credential = stored.as_deref().and_then(Credential::new);
            let generation = self.transition(SessionMode::Authenticated, credential);
            info!("Restored authenticated session");
            let cart = self.fetch_canonical().await?;
            self.commit(generation, cart);
        } else {
            let generation = self.transition(SessionMode::Guest, None);
            let cart = self.inner.store.load_cart().await;
            self.commit(generation, cart);
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The current cart snapshot.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner.publisher.borrow().clone()
    }

    /// The current session mode.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.state(|s| s.mode)
    }

    /// Subscribe to cart snapshots. Every published value is a complete
    /// cart; the receiver always holds the latest one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.inner.publisher.subscribe()
    }

    /// Quantity of a product in the current snapshot; zero when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.inner.publisher.borrow().quantity_of(product_id)
    }

    // =========================================================================
    // Session transitions
    // =========================================================================

    /// Apply an authentication-state change.
    ///
    /// - `loading == true` defers: nothing happens.
    /// - Guest -> valid credential: merge-on-login, returns the report.
    /// - Authenticated -> logged out: reset to an empty guest cart.
    /// - Anything else is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the post-merge or post-login fetch failure. Per-item
    /// merge failures are not errors; they land in the [`MergeReport`].
    #[instrument(skip_all, fields(is_authenticated = auth.is_authenticated, loading = auth.loading))]
    pub async fn apply_auth(&self, auth: AuthSnapshot) -> Result<Option<MergeReport>, CartError> {
        if auth.loading {
            return Ok(None);
        }

        let _guard = self.inner.ops.lock().await;

        let incoming = auth
            .is_authenticated
            .then(|| auth.credential.as_deref().and_then(Credential::new))
            .flatten();

        match (self.state(|s| s.mode), incoming) {
            (SessionMode::Guest, Some(credential)) => {
                self.login(credential).await.map(Some)
            }
            (SessionMode::Authenticated | SessionMode::Syncing, None) => {
                self.logout().await?;
                Ok(None)
            }
            (SessionMode::Authenticated, Some(credential)) => {
                // Token rotation: swap the credential, no cart movement.
                self.state(|s| s.credential = Some(credential));
                Ok(None)
            }
            // Still guest, still unauthenticated: the guest cart persists.
            (SessionMode::Guest, None) => Ok(None),
            (SessionMode::Syncing, Some(_)) => Ok(None),
        }
    }

    /// Merge-on-login. Caller holds the operation lock.
    async fn login(&self, credential: Credential) -> Result<MergeReport, CartError> {
        let guest_cart = self.cart();
        let generation = self.transition(SessionMode::Syncing, Some(credential.clone()));

        let mut report = MergeReport::default();
        if !guest_cart.is_empty() {
            // Best effort, one item at a time in insertion order. A failed
            // item is recorded and skipped; the canonical fetch below
            // decides what the cart actually contains.
            for item in guest_cart.items.iter().filter(|item| item.quantity > 0) {
                let product_id = item.product_id().clone();
                match self
                    .inner
                    .remote
                    .add(&credential, &product_id, item.quantity)
                    .await
                {
                    Ok(()) => report.succeeded.push(product_id),
                    Err(e) => {
                        warn!(product_id = %product_id, error = %e, "Merge item failed, continuing");
                        report.failed.push((product_id, e));
                    }
                }
            }
        }

        // The guest cart has been handed over (or attempted); it must not
        // resurrect on the next guest session.
        if let Err(e) = self.inner.store.clear_cart().await {
            warn!(error = %e, "Failed to clear guest cart after merge");
        }

        self.state(|s| s.mode = SessionMode::Authenticated);
        info!(
            merged = report.succeeded.len(),
            failed = report.failed.len(),
            "Login merge complete"
        );

        let cart = self.fetch_canonical().await?;
        self.commit(generation, cart);
        Ok(report)
    }

    /// Logout. Caller holds the operation lock.
    async fn logout(&self) -> Result<(), CartError> {
        let generation = self.transition(SessionMode::Guest, None);
        // The authenticated cart is discarded, not re-seeded into the
        // guest store.
        self.inner.store.clear_cart().await?;
        self.inner.store.clear_credential().await?;
        self.commit(generation, Cart::empty());
        info!("Session reset to guest");
        Ok(())
    }

    // =========================================================================
    // Mutations (called through the facade)
    // =========================================================================

    /// Add units of a product.
    ///
    /// # Errors
    ///
    /// Guest mode only fails on storage writes; authenticated mode
    /// propagates remote failures unchanged.
    #[instrument(skip(self, snapshot), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        quantity: u32,
        snapshot: Option<ProductSnapshot>,
    ) -> Result<(), CartError> {
        let _guard = self.inner.ops.lock().await;

        if let Some(credential) = self.credential() {
            let generation = self.current_generation();
            self.inner
                .remote
                .add(&credential, &product_id, quantity)
                .await?;
            let cart = self.fetch_canonical().await?;
            self.commit(generation, cart);
        } else {
            self.guest_mutate(|cart| cart.add_item(product_id, quantity, snapshot))
                .await?;
        }
        Ok(())
    }

    /// Set the quantity of a product. The facade routes `<= 0` to
    /// [`remove_item`](Self::remove_item) before this is reached.
    ///
    /// # Errors
    ///
    /// Guest mode only fails on storage writes; authenticated mode
    /// propagates remote failures unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_item(&self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let _guard = self.inner.ops.lock().await;

        if let Some(credential) = self.credential() {
            let generation = self.current_generation();
            self.inner
                .remote
                .update(&credential, &product_id, quantity)
                .await?;
            let cart = self.fetch_canonical().await?;
            self.commit(generation, cart);
        } else {
            self.guest_mutate(|cart| cart.set_quantity(&product_id, quantity))
                .await?;
        }
        Ok(())
    }

    /// Remove a product. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Guest mode only fails on storage writes; authenticated mode
    /// propagates remote failures unchanged.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: ProductId) -> Result<(), CartError> {
        let _guard = self.inner.ops.lock().await;

        if let Some(credential) = self.credential() {
            let generation = self.current_generation();
            self.inner.remote.remove(&credential, &product_id).await?;
            let cart = self.fetch_canonical().await?;
            self.commit(generation, cart);
        } else {
            self.guest_mutate(|cart| cart.remove_item(&product_id)).await?;
        }
        Ok(())
    }

    /// Remove every item.
    ///
    /// # Errors
    ///
    /// Guest mode only fails on storage writes; authenticated mode
    /// propagates remote failures unchanged.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        let _guard = self.inner.ops.lock().await;

        if let Some(credential) = self.credential() {
            let generation = self.current_generation();
            self.inner.remote.clear(&credential).await?;
            let cart = self.fetch_canonical().await?;
            self.commit(generation, cart);
        } else {
            let generation = self.current_generation();
            self.inner.store.clear_cart().await?;
            self.commit(generation, Cart::empty());
        }
        Ok(())
    }

    /// Re-read the authoritative store and publish the result.
    ///
    /// # Errors
    ///
    /// Propagates the remote fetch failure in authenticated mode.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Cart, CartError> {
        let _guard = self.inner.ops.lock().await;

        let generation = self.current_generation();
        let cart = if self.credential().is_some() {
            self.fetch_canonical().await?
        } else {
            self.inner.store.load_cart().await
        };
        self.commit(generation, cart.clone());
        Ok(cart)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        #[allow(clippy::unwrap_used)] // state lock is never poisoned: no panics while held
        let mut state = self.inner.state.lock().unwrap();
        f(&mut state)
    }

    fn credential(&self) -> Option<Credential> {
        self.state(|s| s.credential.clone())
    }

    fn current_generation(&self) -> u64 {
        self.state(|s| s.generation)
    }

    /// Change session mode and credential, invalidating in-flight results.
    /// Returns the new generation for the caller's own commits.
    fn transition(&self, mode: SessionMode, credential: Option<Credential>) -> u64 {
        self.state(|s| {
            s.mode = mode;
            s.credential = credential;
            s.generation += 1;
            s.generation
        })
    }

    /// Publish a snapshot unless a session transition has intervened since
    /// `generation` was captured, in which case the result is stale and dropped.
    fn commit(&self, generation: u64, cart: Cart) {
        let current = self.current_generation();
        if current == generation {
            self.inner.publisher.send_replace(cart);
        } else {
            warn!(
                captured = generation,
                current, "Discarding stale cart snapshot from superseded operation"
            );
        }
    }

    async fn fetch_canonical(&self) -> Result<Cart, CartError> {
        let credential = self.credential().ok_or(CartError::AuthRequired)?;
        self.inner.remote.fetch(&credential).await
    }

    /// Guest-mode mutation: recompute in memory, persist, publish.
    async fn guest_mutate(&self, f: impl FnOnce(&mut Cart)) -> Result<(), CartError> {
        let generation = self.current_generation();
        let mut cart = self.cart();
        f(&mut cart);
        self.inner.store.save_cart(&cart).await?;
        self.commit(generation, cart);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    /// Remote double for guest-only tests; any call is a test failure
    /// waiting to be observed as an error.
    struct NoRemote;

    #[async_trait]
    impl RemoteCart for NoRemote {
        async fn fetch(&self, _: &Credential) -> Result<Cart, CartError> {
            Err(CartError::AuthRequired)
        }
        async fn add(&self, _: &Credential, _: &ProductId, _: u32) -> Result<(), CartError> {
            Err(CartError::AuthRequired)
        }
        async fn update(&self, _: &Credential, _: &ProductId, _: u32) -> Result<(), CartError> {
            Err(CartError::AuthRequired)
        }
        async fn remove(&self, _: &Credential, _: &ProductId) -> Result<(), CartError> {
            Err(CartError::AuthRequired)
        }
        async fn clear(&self, _: &Credential) -> Result<(), CartError> {
            Err(CartError::AuthRequired)
        }
    }

    fn guest_reconciler() -> (tempfile::TempDir, CartReconciler) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCartStore::new(dir.path().to_path_buf());
        let reconciler = CartReconciler::new(store, Arc::new(NoRemote));
        (dir, reconciler)
    }

    fn snapshot(id: &str, cents: i64) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::new(id),
            name: id.to_string(),
            price: Decimal::new(cents, 2),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_starts_guest_without_credential() {
        let (_dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();
        assert_eq!(reconciler.mode(), SessionMode::Guest);
        assert!(reconciler.cart().is_empty());
    }

    #[tokio::test]
    async fn test_start_restores_persisted_guest_cart() {
        let (dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();
        reconciler
            .add_item(ProductId::new("a"), 2, Some(snapshot("a", 500)))
            .await
            .unwrap();

        // A new engine over the same directory sees the same cart.
        let store = LocalCartStore::new(dir.path().to_path_buf());
        let restored = CartReconciler::new(store, Arc::new(NoRemote));
        restored.start().await.unwrap();
        assert_eq!(restored.quantity_of(&ProductId::new("a")), 2);
        assert_eq!(restored.cart().total, Decimal::new(1000, 2));
    }

    #[tokio::test]
    async fn test_invalid_stored_credential_starts_guest() {
        let (dir, _) = guest_reconciler();
        let store = LocalCartStore::new(dir.path().to_path_buf());
        store.save_credential("undefined").await.unwrap();

        let reconciler = CartReconciler::new(store, Arc::new(NoRemote));
        reconciler.start().await.unwrap();
        assert_eq!(reconciler.mode(), SessionMode::Guest);
    }

    #[tokio::test]
    async fn test_guest_mutations_publish_snapshots() {
        let (_dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();
        let mut rx = reconciler.subscribe();

        reconciler
            .add_item(ProductId::new("a"), 3, Some(snapshot("a", 100)))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.item_count, 3);
        assert_eq!(seen.savings, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_loading_defers_all_transitions() {
        let (_dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();
        reconciler
            .add_item(ProductId::new("a"), 1, Some(snapshot("a", 100)))
            .await
            .unwrap();

        let report = reconciler
            .apply_auth(AuthSnapshot {
                credential: Some("tok".to_string()),
                is_authenticated: true,
                loading: true,
            })
            .await
            .unwrap();

        assert!(report.is_none());
        assert_eq!(reconciler.mode(), SessionMode::Guest);
        assert_eq!(reconciler.quantity_of(&ProductId::new("a")), 1);
    }

    #[tokio::test]
    async fn test_reentrant_guest_auth_is_noop() {
        let (_dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();
        reconciler
            .add_item(ProductId::new("a"), 1, Some(snapshot("a", 100)))
            .await
            .unwrap();

        let report = reconciler
            .apply_auth(AuthSnapshot {
                credential: Some("null".to_string()),
                is_authenticated: false,
                loading: false,
            })
            .await
            .unwrap();

        assert!(report.is_none());
        assert_eq!(reconciler.quantity_of(&ProductId::new("a")), 1);
    }

    #[tokio::test]
    async fn test_stale_generation_commit_is_discarded() {
        let (_dir, reconciler) = guest_reconciler();
        reconciler.start().await.unwrap();

        let generation = reconciler.current_generation();
        reconciler.transition(SessionMode::Guest, None);

        let mut stale = Cart::empty();
        stale.add_item(ProductId::new("stale"), 1, Some(snapshot("stale", 100)));
        reconciler.commit(generation, stale);

        assert!(reconciler.cart().is_empty());
    }
}
