//! Nimzo cart reconciliation engine.
//!
//! Keeps a single in-memory [`Cart`](nimzo_core::Cart) consistent across
//! two session modes: an unauthenticated guest whose cart lives in a local
//! file store, and an authenticated user whose cart is owned by the remote
//! backend (including server-computed totals and promotional savings).
//!
//! # Architecture
//!
//! - [`token`] - Credential validation (filters placeholder/corrupted values)
//! - [`store`] - Durable local key-value persistence for the guest cart
//! - [`remote`] - Credential-gated client for the remote cart API
//! - [`reconciler`] - The session state machine and login-time merge
//! - [`facade`] - The mutation surface consumed by presentation code
//!
//! # Example
//!
//! ```rust,ignore
//! use nimzo_cart::{CartConfig, CartFacade, CartReconciler, HttpCartClient, LocalCartStore};
//! use std::sync::Arc;
//!
//! let config = CartConfig::from_env()?;
//! let store = LocalCartStore::new(config.state_dir.clone());
//! let remote = Arc::new(HttpCartClient::new(config.backend_url.clone()));
//!
//! let reconciler = CartReconciler::new(store, remote);
//! reconciler.start().await?;
//!
//! let cart = CartFacade::new(reconciler);
//! cart.add_item_one("prod-42".into(), None).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod facade;
pub mod reconciler;
pub mod remote;
pub mod store;
pub mod token;

pub use config::{CartConfig, ConfigError};
pub use error::CartError;
pub use facade::CartFacade;
pub use reconciler::{AuthSnapshot, CartReconciler, MergeReport, SessionMode};
pub use remote::{HttpCartClient, RemoteCart};
pub use store::LocalCartStore;
pub use token::Credential;
