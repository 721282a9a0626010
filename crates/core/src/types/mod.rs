//! Core types for the Nimzo cart.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;

pub use cart::{Cart, CartItem, Merchandise, ProductSnapshot};
pub use id::*;
