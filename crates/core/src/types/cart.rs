//! The `Cart` aggregate and its line items.
//!
//! A cart is a set of line items unique by product ID plus three summary
//! fields (`total`, `item_count`, `savings`). In guest mode the summaries
//! are recomputed locally after every mutation; in authenticated mode they
//! are whatever the backend last returned and are never recomputed here.
//!
//! The wire shape (what the backend sends and what the guest-cart file
//! stores) is `{product_id, quantity, product?}` per item. Internally a
//! line item carries a [`Merchandise`] variant instead of an ambiguous
//! optional product, so read sites match on `Resolved`/`Unresolved` rather
//! than probing an `Option`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::id::ProductId;

/// Reduced, denormalized product copy captured at add time.
///
/// Guest mode has no catalog access after the add, so the price and display
/// fields travel with the cart item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price at the time the item was added.
    pub price: Decimal,
    /// Product image URL, if one exists.
    pub image: Option<String>,
}

/// What a cart line item points at.
///
/// `Resolved` carries a full [`ProductSnapshot`]; `Unresolved` carries only
/// the product ID (an authenticated cart whose backend response omitted
/// product data, or a guest file written before the snapshot existed).
#[derive(Debug, Clone, PartialEq)]
pub enum Merchandise {
    /// Product data is available.
    Resolved(ProductSnapshot),
    /// Only the product ID is known.
    Unresolved(ProductId),
}

impl Merchandise {
    /// The product ID, regardless of resolution.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        match self {
            Self::Resolved(snapshot) => &snapshot.id,
            Self::Unresolved(id) => id,
        }
    }

    /// Unit price; zero when no product data is available.
    #[must_use]
    pub fn price(&self) -> Decimal {
        match self {
            Self::Resolved(snapshot) => snapshot.price,
            Self::Unresolved(_) => Decimal::ZERO,
        }
    }

    /// The snapshot, if resolved.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&ProductSnapshot> {
        match self {
            Self::Resolved(snapshot) => Some(snapshot),
            Self::Unresolved(_) => None,
        }
    }
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CartItemWire", into = "CartItemWire")]
pub struct CartItem {
    /// The product this line refers to.
    pub merchandise: Merchandise,
    /// Units of the product. Always positive; a zero quantity means the
    /// line is removed, not stored.
    pub quantity: u32,
}

impl CartItem {
    /// The product ID of this line.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        self.merchandise.product_id()
    }

    /// Line total (`quantity * unit price`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.merchandise.price() * Decimal::from(self.quantity)
    }
}

/// Wire shape for a cart line: `{product_id, quantity, product?}`.
///
/// Kept distinct from [`CartItem`] so the serialized format stays pinned to
/// what the backend speaks while the in-memory shape can differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CartItemWire {
    product_id: ProductId,
    quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<ProductSnapshot>,
}

impl From<CartItemWire> for CartItem {
    fn from(wire: CartItemWire) -> Self {
        let merchandise = wire.product.map_or_else(
            || Merchandise::Unresolved(wire.product_id.clone()),
            Merchandise::Resolved,
        );
        Self {
            merchandise,
            // Negative quantities from a faulty peer clamp to zero and are
            // dropped by the next recompute.
            quantity: u32::try_from(wire.quantity).unwrap_or(0),
        }
    }
}

impl From<CartItem> for CartItemWire {
    fn from(item: CartItem) -> Self {
        let product_id = item.product_id().clone();
        let product = match item.merchandise {
            Merchandise::Resolved(snapshot) => Some(snapshot),
            Merchandise::Unresolved(_) => None,
        };
        Self {
            product_id,
            quantity: i64::from(item.quantity),
            product,
        }
    }
}

/// The cart aggregate.
///
/// Items are unique by product ID; ordering is insertion order and carries
/// no meaning beyond merge sequencing at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Line items, unique by product ID.
    pub items: Vec<CartItem>,
    /// Cart total. Locally computed in guest mode, server-computed otherwise.
    pub total: Decimal,
    /// Total number of units across all lines.
    pub item_count: u32,
    /// Promotional savings. Always zero in guest mode (no discount data
    /// exists locally).
    pub savings: Decimal,
}

impl Default for Cart {
    fn default() -> Self {
        Self::empty()
    }
}

impl Cart {
    /// An empty cart with zeroed summaries.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: Decimal::ZERO,
            item_count: 0,
            savings: Decimal::ZERO,
        }
    }

    /// Whether the cart holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity of a product in the cart; zero when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .find(|item| item.product_id() == product_id)
            .map_or(0, |item| item.quantity)
    }

    /// Add units of a product, merging with an existing line for the same
    /// product. A snapshot upgrades an `Unresolved` line in place.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        snapshot: Option<ProductSnapshot>,
    ) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| *item.product_id() == product_id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
            if let Some(snapshot) = snapshot {
                item.merchandise = Merchandise::Resolved(snapshot);
            }
        } else {
            let merchandise = snapshot.map_or(
                Merchandise::Unresolved(product_id),
                Merchandise::Resolved,
            );
            self.items.push(CartItem {
                merchandise,
                quantity,
            });
        }
        self.recompute_guest_totals();
    }

    /// Set the quantity of a product. Zero removes the line (invariant: no
    /// zero-quantity entries are stored). Setting a quantity for an absent
    /// product is a no-op.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product_id() == product_id)
        {
            item.quantity = quantity;
        }
        self.recompute_guest_totals();
    }

    /// Remove a product's line. Removing an absent product is a no-op.
    pub fn remove_item(&mut self, product_id: &ProductId) {
        self.items.retain(|item| item.product_id() != product_id);
        self.recompute_guest_totals();
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute_guest_totals();
    }

    /// Recompute the summary fields from the items, guest-mode style:
    /// zero-quantity lines are dropped, `total` is the sum of line totals,
    /// and `savings` is zero. Never called on an authenticated cart, whose
    /// summaries belong to the backend.
    pub fn recompute_guest_totals(&mut self) {
        self.items.retain(|item| item.quantity > 0);
        self.item_count = self.items.iter().map(|item| item.quantity).sum();
        self.total = self.items.iter().map(CartItem::line_total).sum();
        self.savings = Decimal::ZERO;
    }
}
