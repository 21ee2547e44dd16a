use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use storefront_sdk::auth::InMemoryAuthenticator;
use storefront_sdk::records::{OrderStatus, OrderUpdate};
use storefront_sdk::storage::{HttpObjectStore, ObjectStore, PRODUCT_IMAGE_PREFIX};
use storefront_sdk::{CollectionGateway, Cursor, GatewayError, StorefrontClient, TokenSource};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

fn order(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "userId": "u1",
        "items": [],
        "customerDetails": { "name": name, "email": format!("{name}@example.com") },
        "totalAmount": 1000,
        "orderStatus": "Pending",
        "createdAt": { "_seconds": 1_700_000_000, "_nanoseconds": 0 }
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"))
}

async fn list_orders(
    State(hits): State<Hits>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    hits.0.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "no token" })));
    }
    let body = match params.get("lastVisible").map(String::as_str) {
        None => json!({
            "message": "ok",
            "data": { "orders": [order("o1", "ana"), order("o2", "budi")], "lastVisible": "o2" }
        }),
        Some("o2") => json!({
            "message": "ok",
            "data": { "orders": [order("o3", "citra")], "lastVisible": null }
        }),
        Some(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad cursor" }))),
    };
    (StatusCode::OK, Json(body))
}

async fn customer_orders(Path(user_id): Path<String>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "message": "ok",
            "data": { "orders": [order(&format!("{user_id}-o1"), "ana")], "lastVisible": null }
        })),
    )
}

async fn update_order(Path(id): Path<String>, Json(body): Json<Value>) -> StatusCode {
    if id == "missing" {
        return StatusCode::NOT_FOUND;
    }
    assert_eq!(body["orderStatus"], "Shipped");
    StatusCode::NO_CONTENT
}

async fn spawn_api(hits: Hits) -> Result<String, Box<dyn std::error::Error>> {
    let router = Router::new()
        .route("/api/orders", get(list_orders))
        .route("/api/orders/user/:user_id", get(customer_orders))
        .route("/api/orders/:id", put(update_order))
        .with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    Ok(format!("http://{addr}/api"))
}

fn signed_in() -> Arc<dyn TokenSource> {
    Arc::new(InMemoryAuthenticator::new().signed_in_as("admin@shop.test"))
}

#[tokio::test]
async fn pages_follow_the_last_visible_cursor() -> TestResult {
    let base = spawn_api(Hits::default()).await?;
    let orders = StorefrontClient::new(base, signed_in()).orders();

    let first = orders.fetch_page(None, "").await?;
    assert_eq!(first.records.len(), 2);
    assert_eq!(first.cursor, Some(Cursor::new("o2")));

    let second = orders.fetch_page(first.cursor.as_ref(), "").await?;
    assert_eq!(second.records[0].id, "o3");
    assert!(second.cursor.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() -> TestResult {
    let hits = Hits::default();
    let base = spawn_api(hits.clone()).await?;
    let tokens: Arc<dyn TokenSource> = Arc::new(InMemoryAuthenticator::new());
    let orders = StorefrontClient::new(base, tokens).orders();

    let err = orders.fetch_page(None, "").await.unwrap_err();
    assert_eq!(err, GatewayError::Unauthorized);
    assert_eq!(hits.0.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn rejected_tokens_map_to_unauthorized() -> TestResult {
    struct Forged;
    impl TokenSource for Forged {
        fn current_token(&self) -> Option<String> {
            Some("forged".into())
        }
    }
    let hits = Hits::default();
    let base = spawn_api(hits.clone()).await?;
    let orders = StorefrontClient::new(base, Arc::new(Forged)).orders();

    let err = orders.fetch_page(None, "").await.unwrap_err();
    assert_eq!(err, GatewayError::Unauthorized);
    assert_eq!(hits.0.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn empty_update_response_is_acknowledged() -> TestResult {
    let base = spawn_api(Hits::default()).await?;
    let orders = StorefrontClient::new(base, signed_in()).orders();

    let echoed = orders
        .update_record("o1", &OrderUpdate::status(OrderStatus::Shipped))
        .await?;
    assert!(echoed.is_none());

    let err = orders
        .update_record("missing", &OrderUpdate::status(OrderStatus::Shipped))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::NotFound("missing".into()));
    Ok(())
}

#[tokio::test]
async fn customer_order_history_uses_user_path() -> TestResult {
    let base = spawn_api(Hits::default()).await?;
    let history = StorefrontClient::new(base, signed_in()).customer_orders("u42");

    let page = history.fetch_page(None, "").await?;
    assert_eq!(page.records[0].id, "u42-o1");
    assert!(!page.has_more());
    Ok(())
}

#[derive(Clone, Default)]
struct Bucket {
    objects: Arc<Mutex<HashSet<String>>>,
    deletes: Hits,
}

async fn delete_object(State(bucket): State<Bucket>, Path(name): Path<String>, headers: HeaderMap) -> StatusCode {
    bucket.deletes.0.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if bucket.objects.lock().remove(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn spawn_bucket(bucket: Bucket) -> Result<String, Box<dyn std::error::Error>> {
    let router = Router::new()
        .route("/v0/b/shop/o/:name", delete(delete_object))
        .with_state(bucket);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    Ok(format!("http://{addr}/v0/b/shop"))
}

#[tokio::test]
async fn image_delete_is_idempotent() -> TestResult {
    let bucket = Bucket::default();
    bucket.objects.lock().insert("product_images/abc".into());
    let base = spawn_bucket(bucket.clone()).await?;
    let store = HttpObjectStore::new(base.clone(), PRODUCT_IMAGE_PREFIX, signed_in());
    let url = format!("{base}/o/product%5Fimages%2Fabc?alt=media&token=t1");

    store.delete_by_url(&url).await?;
    assert!(bucket.objects.lock().is_empty());

    // Already gone: the store answers 404.
    store.delete_by_url(&url).await?;
    assert_eq!(bucket.deletes.0.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn foreign_image_urls_are_left_alone() -> TestResult {
    let bucket = Bucket::default();
    let base = spawn_bucket(bucket.clone()).await?;
    let store = HttpObjectStore::new(base, PRODUCT_IMAGE_PREFIX, signed_in());

    store
        .delete_by_url("https://cdn.elsewhere.test/images/tea.png")
        .await?;
    assert_eq!(bucket.deletes.0.load(Ordering::SeqCst), 0);
    Ok(())
}
