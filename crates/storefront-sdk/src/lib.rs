//! Asynchronous client for the storefront admin APIs.
//!
//! The dashboard consumes this crate for every remote concern: paginated
//! collection queries and single-record mutations against the document store,
//! password sign-in against the identity provider, and image upload/delete
//! against the object store. Each concern is a trait with an HTTP
//! implementation and an in-memory double for tests and offline wiring.

pub mod auth;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod records;
pub mod storage;

use std::sync::Arc;

use reqwest::Client;

pub use auth::{AuthError, AuthState, Authenticator, Credential, TokenSource};
pub use gateway::{CollectionGateway, Cursor, GatewayError, GatewayHandle, Page};
pub use records::{Customer, Order, OrderStatus, PaymentStatus, Product, Record};

use crate::http::{CustomerOrdersGateway, HttpCollectionGateway};

/// Entry point for the HTTP-backed collection gateways.
///
/// Every gateway built from one client shares the connection pool and the
/// credential source.
#[derive(Clone)]
pub struct StorefrontClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl StorefrontClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self::with_http(Client::new(), base_url, tokens)
    }

    pub fn with_http(http: Client, base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn products(&self) -> GatewayHandle<Product> {
        Arc::new(self.collection::<Product>())
    }

    pub fn customers(&self) -> GatewayHandle<Customer> {
        Arc::new(self.collection::<Customer>())
    }

    pub fn orders(&self) -> GatewayHandle<Order> {
        Arc::new(self.collection::<Order>())
    }

    /// Order history of a single customer, paginated like any other collection.
    pub fn customer_orders(&self, user_id: impl Into<String>) -> GatewayHandle<Order> {
        Arc::new(CustomerOrdersGateway::new(
            self.collection::<Order>(),
            user_id,
        ))
    }

    fn collection<R: http::EndpointRecord>(&self) -> HttpCollectionGateway<R> {
        HttpCollectionGateway::new(self.http.clone(), self.base_url.clone(), self.tokens.clone())
    }
}
