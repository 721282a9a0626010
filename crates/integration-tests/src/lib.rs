//! Test support for end-to-end cart engine scenarios.
//!
//! Provides [`ScriptedRemote`], a `RemoteCart` double that records every
//! call in order and serves a scripted canonical cart, so the scenarios in
//! `tests/` can assert on exact call sequences without a network.

#![allow(clippy::unwrap_used)] // test support crate

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use nimzo_cart::{CartError, Credential, RemoteCart};
use nimzo_core::{Cart, ProductId};

/// Install a test tracing subscriber honoring `RUST_LOG`. Safe to call
/// from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch,
    Add(ProductId, u32),
    Update(ProductId, u32),
    Remove(ProductId),
    Clear,
}

/// A scripted stand-in for the remote cart API.
///
/// `fetch` serves whatever cart was last scripted; mutations succeed and
/// are recorded unless configured to fail. `reject_all` simulates an
/// expired credential (every call answers `AuthRequired`).
#[derive(Default)]
pub struct ScriptedRemote {
    calls: Mutex<Vec<RemoteCall>>,
    canonical: Mutex<Cart>,
    failing_adds: Mutex<HashSet<ProductId>>,
    reject_all: AtomicBool,
}

impl ScriptedRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script what the next `fetch` calls return.
    pub fn set_canonical(&self, cart: Cart) {
        *self.canonical.lock().unwrap() = cart;
    }

    /// Make `add` fail with a 502 for the given product.
    pub fn fail_add_for(&self, product_id: ProductId) {
        self.failing_adds.lock().unwrap().insert(product_id);
    }

    /// Answer every call with `AuthRequired`.
    pub fn reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    /// Calls recorded so far, in issue order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RemoteCall) -> Result<(), CartError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(CartError::AuthRequired);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl RemoteCart for ScriptedRemote {
    async fn fetch(&self, _credential: &Credential) -> Result<Cart, CartError> {
        self.record(RemoteCall::Fetch)?;
        Ok(self.canonical.lock().unwrap().clone())
    }

    async fn add(
        &self,
        _credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        self.record(RemoteCall::Add(product_id.clone(), quantity))?;
        if self.failing_adds.lock().unwrap().contains(product_id) {
            return Err(CartError::RemoteStatus(reqwest::StatusCode::BAD_GATEWAY));
        }
        Ok(())
    }

    async fn update(
        &self,
        _credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        self.record(RemoteCall::Update(product_id.clone(), quantity))
    }

    async fn remove(
        &self,
        _credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), CartError> {
        self.record(RemoteCall::Remove(product_id.clone()))
    }

    async fn clear(&self, _credential: &Credential) -> Result<(), CartError> {
        self.record(RemoteCall::Clear)
    }
}
