//! Remote cart API client.
//!
//! The backend is the authority for authenticated carts: every mutation is
//! a single request with no retry or batching, and callers re-fetch to
//! observe the canonical result. All calls are credential-gated; the
//! [`RemoteCart`] trait is the seam that lets the reconciler run against a
//! scripted double in tests.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use nimzo_core::{Cart, ProductId};

use crate::error::CartError;
use crate::token::Credential;

/// Port to the remote cart API.
///
/// Mutations return `()` by design; the canonical cart is only observable
/// through [`fetch`](RemoteCart::fetch).
#[async_trait]
pub trait RemoteCart: Send + Sync {
    /// GET the canonical cart.
    async fn fetch(&self, credential: &Credential) -> Result<Cart, CartError>;

    /// Add units of a product.
    async fn add(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError>;

    /// Set the quantity of a product.
    async fn update(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError>;

    /// Remove a product.
    async fn remove(&self, credential: &Credential, product_id: &ProductId)
    -> Result<(), CartError>;

    /// Remove every item.
    async fn clear(&self, credential: &Credential) -> Result<(), CartError>;
}

/// Request body for add and update calls.
#[derive(Debug, Serialize)]
struct LineBody<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

/// HTTP client for the remote cart API.
#[derive(Clone)]
pub struct HttpCartClient {
    inner: Arc<HttpCartClientInner>,
}

struct HttpCartClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCartClient {
    /// Create a new cart API client.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            inner: Arc::new(HttpCartClientInner {
                client: reqwest::Client::new(),
                base_url,
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, CartError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Map a response status to the error taxonomy. Success statuses pass
    /// through; 401/403 mean the credential was rejected.
    fn check_status(status: StatusCode) -> Result<(), CartError> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CartError::AuthRequired);
        }
        Err(CartError::RemoteStatus(status))
    }
}

#[async_trait]
impl RemoteCart for HttpCartClient {
    #[instrument(skip_all)]
    async fn fetch(&self, credential: &Credential) -> Result<Cart, CartError> {
        let response = self
            .inner
            .client
            .get(self.endpoint("cart")?)
            .bearer_auth(credential.expose())
            .send()
            .await?;

        Self::check_status(response.status())?;

        // Read the body as text first so schema mismatches are
        // distinguishable from transport failures.
        let body = response.text().await?;
        let cart = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Cart response did not match schema"
            );
            CartError::MalformedResponse(e)
        })?;

        Ok(cart)
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn add(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("cart/add")?)
            .bearer_auth(credential.expose())
            .json(&LineBody {
                product_id,
                quantity,
            })
            .send()
            .await?;

        Self::check_status(response.status())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn update(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        let response = self
            .inner
            .client
            .put(self.endpoint("cart/update")?)
            .bearer_auth(credential.expose())
            .json(&LineBody {
                product_id,
                quantity,
            })
            .send()
            .await?;

        Self::check_status(response.status())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn remove(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> Result<(), CartError> {
        let response = self
            .inner
            .client
            .delete(self.endpoint(&format!("cart/remove/{product_id}"))?)
            .bearer_auth(credential.expose())
            .send()
            .await?;

        Self::check_status(response.status())
    }

    #[instrument(skip_all)]
    async fn clear(&self, credential: &Credential) -> Result<(), CartError> {
        let response = self
            .inner
            .client
            .delete(self.endpoint("cart/clear")?)
            .bearer_auth(credential.expose())
            .send()
            .await?;

        Self::check_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_success() {
        assert!(HttpCartClient::check_status(StatusCode::OK).is_ok());
        assert!(HttpCartClient::check_status(StatusCode::NO_CONTENT).is_ok());
    }

    #[test]
    fn test_check_status_credential_rejected() {
        assert!(matches!(
            HttpCartClient::check_status(StatusCode::UNAUTHORIZED),
            Err(CartError::AuthRequired)
        ));
        assert!(matches!(
            HttpCartClient::check_status(StatusCode::FORBIDDEN),
            Err(CartError::AuthRequired)
        ));
    }

    #[test]
    fn test_check_status_server_error() {
        assert!(matches!(
            HttpCartClient::check_status(StatusCode::BAD_GATEWAY),
            Err(CartError::RemoteStatus(StatusCode::BAD_GATEWAY))
        ));
    }

    #[test]
    fn test_endpoint_joins_against_base() {
        let client = HttpCartClient::new("https://api.example.com/".parse().expect("url"));
        let url = client.endpoint("cart/remove/prod-1").expect("endpoint");
        assert_eq!(url.as_str(), "https://api.example.com/cart/remove/prod-1");
    }
}
