//! Nimzo Core - Shared types library.
//!
//! This crate provides the domain types used across all Nimzo cart
//! components:
//! - `cart` - The cart reconciliation engine
//! - `integration-tests` - End-to-end scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere, including inside synchronous guest-mode arithmetic where
//! no failure path exists.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, product snapshots, and the `Cart` aggregate

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
