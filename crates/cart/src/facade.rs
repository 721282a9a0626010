//! Public mutation surface consumed by presentation code.
//!
//! Thin delegate over [`CartReconciler`]. The one piece of policy that
//! lives here is quantity guarding: `set_quantity` with a non-positive
//! quantity is routed to removal at this single entry point, so no call
//! site ever issues an update with quantity zero.

use nimzo_core::{Cart, ProductId, ProductSnapshot};
use tokio::sync::watch;

use crate::error::CartError;
use crate::reconciler::{CartReconciler, SessionMode};

/// The cart operation surface.
#[derive(Clone)]
pub struct CartFacade {
    reconciler: CartReconciler,
}

impl CartFacade {
    /// Wrap a reconciler.
    #[must_use]
    pub const fn new(reconciler: CartReconciler) -> Self {
        Self { reconciler }
    }

    /// Add units of a product. Guest mode wants a [`ProductSnapshot`] so
    /// the price travels with the item; authenticated mode ignores it.
    ///
    /// # Errors
    ///
    /// Propagates remote failures in authenticated mode and storage write
    /// failures in guest mode.
    pub async fn add_item(
        &self,
        product_id: ProductId,
        quantity: u32,
        snapshot: Option<ProductSnapshot>,
    ) -> Result<(), CartError> {
        self.reconciler.add_item(product_id, quantity, snapshot).await
    }

    /// Add a single unit of a product (the common storefront gesture).
    ///
    /// # Errors
    ///
    /// Same as [`add_item`](Self::add_item).
    pub async fn add_item_one(
        &self,
        product_id: ProductId,
        snapshot: Option<ProductSnapshot>,
    ) -> Result<(), CartError> {
        self.add_item(product_id, 1, snapshot).await
    }

    /// Set the quantity of a product. A quantity of zero or less removes
    /// the item instead; an update with quantity zero is never issued.
    ///
    /// # Errors
    ///
    /// Propagates remote failures in authenticated mode and storage write
    /// failures in guest mode.
    pub async fn set_quantity(&self, product_id: ProductId, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            return self.reconciler.remove_item(product_id).await;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.reconciler.update_item(product_id, quantity).await
    }

    /// Remove a product from the cart. Removing an absent product is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Propagates remote failures in authenticated mode and storage write
    /// failures in guest mode.
    pub async fn remove_item(&self, product_id: ProductId) -> Result<(), CartError> {
        self.reconciler.remove_item(product_id).await
    }

    /// Remove every item.
    ///
    /// # Errors
    ///
    /// Propagates remote failures in authenticated mode and storage write
    /// failures in guest mode.
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        self.reconciler.clear().await
    }

    /// Re-read the authoritative store and publish the result.
    ///
    /// # Errors
    ///
    /// Propagates the remote fetch failure in authenticated mode.
    pub async fn refresh(&self) -> Result<Cart, CartError> {
        self.reconciler.refresh().await
    }

    /// Quantity of a product in the current snapshot. Never negative;
    /// zero when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.reconciler.quantity_of(product_id)
    }

    /// The current cart snapshot.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.reconciler.cart()
    }

    /// The current session mode (presentation code renders `Syncing` as a
    /// loading state).
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.reconciler.mode()
    }

    /// Subscribe to cart snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Cart> {
        self.reconciler.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reconciler::CartReconciler;
    use crate::remote::RemoteCart;
    use crate::store::LocalCartStore;
    use crate::token::Credential;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Arc;

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

    async fn guest_facade() -> (tempfile::TempDir, CartFacade) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCartStore::new(dir.path().to_path_buf());
        let reconciler = CartReconciler::new(store, Arc::new(NoRemote));
        reconciler.start().await.unwrap();
        (dir, CartFacade::new(reconciler))
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
    async fn test_set_quantity_zero_equals_remove() {
        let (_dir, facade) = guest_facade().await;
        facade
            .add_item(ProductId::new("a"), 2, Some(snapshot("a", 100)))
            .await
            .unwrap();
        facade.set_quantity(ProductId::new("a"), 0).await.unwrap();

        let via_set = facade.cart();

        let (_dir2, facade2) = guest_facade().await;
        facade2
            .add_item(ProductId::new("a"), 2, Some(snapshot("a", 100)))
            .await
            .unwrap();
        facade2.remove_item(ProductId::new("a")).await.unwrap();

        assert_eq!(via_set, facade2.cart());
        assert!(via_set.is_empty());
    }

    #[tokio::test]
    async fn test_set_quantity_negative_also_removes() {
        let (_dir, facade) = guest_facade().await;
        facade
            .add_item(ProductId::new("a"), 2, Some(snapshot("a", 100)))
            .await
            .unwrap();
        facade.set_quantity(ProductId::new("a"), -3).await.unwrap();
        assert!(facade.cart().is_empty());
    }

    #[tokio::test]
    async fn test_quantity_of_absent_is_zero() {
        let (_dir, facade) = guest_facade().await;
        assert_eq!(facade.quantity_of(&ProductId::new("missing")), 0);
    }

    #[tokio::test]
    async fn test_add_item_one_defaults_quantity() {
        let (_dir, facade) = guest_facade().await;
        facade
            .add_item_one(ProductId::new("a"), Some(snapshot("a", 100)))
            .await
            .unwrap();
        assert_eq!(facade.quantity_of(&ProductId::new("a")), 1);
    }

    #[tokio::test]
    async fn test_guest_totals_follow_mutations() {
        let (_dir, facade) = guest_facade().await;
        facade
            .add_item(ProductId::new("a"), 2, Some(snapshot("a", 4999)))
            .await
            .unwrap();
        facade
            .add_item(ProductId::new("b"), 1, Some(snapshot("b", 1500)))
            .await
            .unwrap();

        let cart = facade.cart();
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.total, Decimal::new(11_498, 2)); // 2*49.99 + 15.00
        assert_eq!(cart.savings, Decimal::ZERO);

        facade.set_quantity(ProductId::new("a"), 1).await.unwrap();
        let cart = facade.cart();
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.total, Decimal::new(6499, 2));
    }
}
