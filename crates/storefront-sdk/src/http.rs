use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::gateway::{CollectionGateway, Cursor, GatewayError, Page};
use crate::records::{Customer, Order, Product, Record};

/// Characters left unescaped when an id is used as a path segment.
pub(crate) const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Where a collection lives and how its list responses are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionEndpoint {
    pub path: &'static str,
    /// Key of the record array inside the response `data` object.
    pub records_key: &'static str,
    /// Key of the continuation token, both in responses and as a query parameter.
    pub cursor_key: &'static str,
}

impl CollectionEndpoint {
    pub const PRODUCTS: CollectionEndpoint = CollectionEndpoint {
        path: "products",
        records_key: "products",
        cursor_key: "nextPageToken",
    };
    pub const CUSTOMERS: CollectionEndpoint = CollectionEndpoint {
        path: "customers",
        records_key: "customers",
        cursor_key: "nextPageToken",
    };
    pub const ORDERS: CollectionEndpoint = CollectionEndpoint {
        path: "orders",
        records_key: "orders",
        cursor_key: "lastVisible",
    };
}

/// Records served by a REST collection.
pub trait EndpointRecord: Record {
    const ENDPOINT: CollectionEndpoint;
}

impl EndpointRecord for Product {
    const ENDPOINT: CollectionEndpoint = CollectionEndpoint::PRODUCTS;
}

impl EndpointRecord for Customer {
    const ENDPOINT: CollectionEndpoint = CollectionEndpoint::CUSTOMERS;
}

impl EndpointRecord for Order {
    const ENDPOINT: CollectionEndpoint = CollectionEndpoint::ORDERS;
}

/// `{ message, data }` wrapper used by every API response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    #[allow(dead_code)]
    message: Option<String>,
    data: T,
}

pub struct HttpCollectionGateway<R> {
    http: Client,
    base_url: String,
    endpoint: CollectionEndpoint,
    tokens: Arc<dyn TokenSource>,
    _record: PhantomData<fn() -> R>,
}

impl<R: EndpointRecord> HttpCollectionGateway<R> {
    pub fn new(http: Client, base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoint: R::ENDPOINT,
            tokens,
            _record: PhantomData,
        }
    }
}

impl<R: Record> HttpCollectionGateway<R> {
    fn token(&self) -> Result<String, GatewayError> {
        self.tokens
            .current_token()
            .ok_or(GatewayError::Unauthorized)
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.endpoint.path)
    }

    fn record_url(&self, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(),
            utf8_percent_encode(id, PATH_SEGMENT)
        )
    }

    /// Lists `url` with the collection's query conventions and decodes one page.
    async fn list(
        &self,
        url: String,
        cursor: Option<&Cursor>,
        search_term: Option<&str>,
    ) -> Result<Page<R>, GatewayError> {
        let token = self.token()?;
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(term) = search_term.filter(|t| !t.is_empty()) {
            query.push(("searchTerm", term));
        }
        if let Some(cursor) = cursor {
            query.push((self.endpoint.cursor_key, cursor.as_str()));
        }

        let res = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&query)
            .send()
            .await?;
        let envelope: Envelope<Value> = check_status(res, None).await?.json().await?;
        let page = decode_page(envelope.data, &self.endpoint)?;
        debug!(
            target: "storefront.gateway",
            collection = self.endpoint.path,
            records = page.records.len(),
            has_more = page.has_more(),
            "fetched page"
        );
        Ok(page)
    }
}

/// Maps non-success statuses onto the gateway taxonomy.
async fn check_status(res: Response, record_id: Option<&str>) -> Result<Response, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::NOT_FOUND if record_id.is_some() => {
            GatewayError::NotFound(record_id.unwrap_or_default().to_string())
        }
        _ => GatewayError::ServerError {
            status: Some(status.as_u16()),
            message: body,
        },
    })
}

/// Decodes `data` as either `{ <records>: [...], <cursor>: token|null }` or a bare array.
fn decode_page<R: Record>(data: Value, endpoint: &CollectionEndpoint) -> Result<Page<R>, GatewayError> {
    match data {
        Value::Array(_) => {
            let records = serde_json::from_value(data)
                .map_err(|err| GatewayError::server(format!("invalid record list: {err}")))?;
            Ok(Page::last(records))
        }
        Value::Object(mut obj) => {
            let records = match obj.remove(endpoint.records_key) {
                Some(list) => serde_json::from_value(list).map_err(|err| {
                    GatewayError::server(format!("invalid {} list: {err}", endpoint.records_key))
                })?,
                None => {
                    return Err(GatewayError::server(format!(
                        "response missing `{}`",
                        endpoint.records_key
                    )))
                }
            };
            let cursor = obj
                .get(endpoint.cursor_key)
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(Cursor::new);
            Ok(Page::new(records, cursor))
        }
        other => Err(GatewayError::server(format!(
            "unexpected page payload: {other}"
        ))),
    }
}

#[async_trait]
impl<R: Record> CollectionGateway<R> for HttpCollectionGateway<R> {
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        search_term: &str,
    ) -> Result<Page<R>, GatewayError> {
        self.list(self.collection_url(), cursor, Some(search_term))
            .await
    }

    async fn fetch_record(&self, id: &str) -> Result<R, GatewayError> {
        let token = self.token()?;
        let res = self
            .http
            .get(self.record_url(id))
            .bearer_auth(&token)
            .send()
            .await?;
        let envelope: Envelope<R> = check_status(res, Some(id)).await?.json().await?;
        Ok(envelope.data)
    }

    async fn create_record(&self, data: &R::Draft) -> Result<R, GatewayError> {
        let token = self.token()?;
        let res = self
            .http
            .post(self.collection_url())
            .bearer_auth(&token)
            .json(data)
            .send()
            .await?;
        let envelope: Envelope<R> = check_status(res, None).await?.json().await?;
        Ok(envelope.data)
    }

    async fn update_record(&self, id: &str, data: &R::Draft) -> Result<Option<R>, GatewayError> {
        let token = self.token()?;
        let res = self
            .http
            .put(self.record_url(id))
            .bearer_auth(&token)
            .json(data)
            .send()
            .await?;
        let body = check_status(res, Some(id)).await?.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Envelope<R>>(&body) {
            Ok(envelope) => Ok(Some(envelope.data)),
            Err(err) => {
                // Some endpoints acknowledge with a bare message.
                debug!(target: "storefront.gateway", record_id = %id, error = %err, "update response carried no record");
                Ok(None)
            }
        }
    }

    async fn delete_record(&self, id: &str) -> Result<(), GatewayError> {
        let token = self.token()?;
        let res = self
            .http
            .delete(self.record_url(id))
            .bearer_auth(&token)
            .send()
            .await?;
        check_status(res, Some(id)).await?;
        Ok(())
    }
}

/// Orders placed by one customer (`GET /orders/user/{user_id}`).
///
/// The endpoint has no search; the search term is ignored. Single-record calls
/// go through the regular order collection.
pub struct CustomerOrdersGateway {
    orders: HttpCollectionGateway<Order>,
    user_id: String,
}

impl CustomerOrdersGateway {
    pub fn new(orders: HttpCollectionGateway<Order>, user_id: impl Into<String>) -> Self {
        Self {
            orders,
            user_id: user_id.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/user/{}",
            self.orders.collection_url(),
            utf8_percent_encode(&self.user_id, PATH_SEGMENT)
        )
    }
}

#[async_trait]
impl CollectionGateway<Order> for CustomerOrdersGateway {
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
        search_term: &str,
    ) -> Result<Page<Order>, GatewayError> {
        if !search_term.is_empty() {
            warn!(target: "storefront.gateway", user_id = %self.user_id, "customer order history ignores search terms");
        }
        self.orders.list(self.url(), cursor, None).await
    }

    async fn fetch_record(&self, id: &str) -> Result<Order, GatewayError> {
        self.orders.fetch_record(id).await
    }

    async fn create_record(&self, data: &<Order as Record>::Draft) -> Result<Order, GatewayError> {
        self.orders.create_record(data).await
    }

    async fn update_record(
        &self,
        id: &str,
        data: &<Order as Record>::Draft,
    ) -> Result<Option<Order>, GatewayError> {
        self.orders.update_record(id, data).await
    }

    async fn delete_record(&self, id: &str) -> Result<(), GatewayError> {
        self.orders.delete_record(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_enveloped_page_with_cursor() {
        let page: Page<Order> = decode_page(
            json!({
                "orders": [],
                "lastVisible": "o-9"
            }),
            &CollectionEndpoint::ORDERS,
        )
        .expect("page");
        assert!(page.records.is_empty());
        assert_eq!(page.cursor, Some(Cursor::new("o-9")));
    }

    #[test]
    fn null_or_empty_cursor_ends_collection() {
        let page: Page<Customer> = decode_page(
            json!({ "customers": [], "nextPageToken": null }),
            &CollectionEndpoint::CUSTOMERS,
        )
        .expect("page");
        assert!(!page.has_more());

        let page: Page<Customer> = decode_page(
            json!({ "customers": [], "nextPageToken": "" }),
            &CollectionEndpoint::CUSTOMERS,
        )
        .expect("page");
        assert!(!page.has_more());
    }

    #[test]
    fn bare_arrays_are_a_single_final_page() {
        let page: Page<Product> = decode_page(
            json!([{ "id": "p1", "name": "Kecap", "price": 450 }]),
            &CollectionEndpoint::PRODUCTS,
        )
        .expect("page");
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "p1");
        assert!(!page.has_more());
    }

    #[test]
    fn missing_record_key_is_server_error() {
        let err = decode_page::<Product>(json!({ "items": [] }), &CollectionEndpoint::PRODUCTS)
            .unwrap_err();
        assert!(matches!(err, GatewayError::ServerError { .. }));
    }

    #[test]
    fn ids_are_escaped_as_path_segments() {
        let encoded = utf8_percent_encode("a b/c-d", PATH_SEGMENT).to_string();
        assert_eq!(encoded, "a%20b%2Fc-d");
    }
}
