//! Wire format and status mapping of `HttpStoreApi` over real HTTP.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::json;

use resale_core::{ProductId, SessionToken};
use resale_integration_tests::TestServer;
use resale_storefront::api::{ApiError, HttpStoreApi, StoreApi};
use resale_storefront::config::ApiConfig;
use resale_storefront::context::SessionContext;
use resale_storefront::testing::{FakeProduct, FakeStore, Fault, Op};

fn ctx() -> SessionContext {
    SessionContext::new(SessionToken::parse("session_1_http").unwrap())
}

fn client(server: &TestServer) -> HttpStoreApi {
    HttpStoreApi::new(&ApiConfig::new(&server.origin()).unwrap()).unwrap()
}

/// A server answering `GET /api/products` with a fixed response.
async fn products_responding(
    response: impl IntoResponse + Clone + Send + Sync + 'static,
) -> TestServer {
    let router = Router::new().route(
        "/api/products",
        get(move || {
            let response = response.clone();
            async move { response }
        }),
    );
    TestServer::serve(router).await.unwrap()
}

// ============================================================================
// Decoding
// ============================================================================

#[tokio::test]
async fn test_products_carry_session_availability() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 2).named("Куртка"));
    let other = SessionToken::parse("session_1_other").unwrap();
    fake.seed_line(&other, ProductId::new(1), 1);
    let server = TestServer::start(fake).await.unwrap();

    let products = client(&server).fetch_products(&ctx()).await.unwrap();

    let product = products.first().unwrap();
    assert_eq!(product.name, "Куртка");
    assert_eq!(product.stock_quantity, 2);
    assert_eq!(product.available_quantity, Some(1));
}

#[tokio::test]
async fn test_pascal_case_payload_is_normalised() {
    let body = json!([{
        "Id": 7,
        "Name": "Платье",
        "Price": "1200.00",
        "QuantityInStock": 3,
        "AvailableQuantity": 2,
        "PublishedAt": "2025-03-01T10:00:00"
    }]);
    let server = products_responding(axum::Json(body)).await;

    let products = client(&server).fetch_products(&ctx()).await.unwrap();

    let product = products.first().unwrap();
    assert_eq!(product.id, ProductId::new(7));
    assert_eq!(product.stock_quantity, 3);
    assert_eq!(product.available_quantity, Some(2));
    assert_eq!(product.published_at.as_deref(), Some("2025-03-01T10:00:00"));
}

#[tokio::test]
async fn test_non_array_listing_is_malformed() {
    let server = products_responding(axum::Json(json!({ "data": [] }))).await;

    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_product_without_name_is_malformed() {
    let server = products_responding(axum::Json(json!([{ "id": 1, "price": 10 }]))).await;

    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
}

// ============================================================================
// Status Mapping
// ============================================================================

#[tokio::test]
async fn test_unauthorized() {
    let server = products_responding(StatusCode::UNAUTHORIZED).await;
    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
}

#[tokio::test]
async fn test_rejection_uses_title_when_message_is_absent() {
    let server = products_responding((
        StatusCode::CONFLICT,
        axum::Json(json!({ "title": "Only 1 left" })),
    ))
    .await;

    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(
        &err,
        ApiError::Rejected { status: 409, message } if message == "Only 1 left"
    ));
    assert!(err.is_insufficient_stock());
}

#[tokio::test]
async fn test_server_error_without_body() {
    let server = products_responding(StatusCode::INTERNAL_SERVER_ERROR).await;

    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(
        &err,
        ApiError::Rejected { status: 500, message }
            if message == "Server error: 500 Internal Server Error"
    ));
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = products_responding((
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "7")],
    ))
    .await;

    let err = client(&server).fetch_products(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::RateLimited(7)));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let server = TestServer::start(FakeStore::new()).await.unwrap();

    let err = client(&server)
        .fetch_product(&ctx(), ProductId::new(99))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(message) if message == "Product 99 not found"));
}

#[tokio::test]
async fn test_injected_malformed_response() {
    let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 1));
    fake.fail_next(Op::FetchCart, Fault::Malformed);
    let server = TestServer::start(fake).await.unwrap();
    let api = client(&server);

    let err = api.fetch_cart(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
    assert!(api.fetch_cart(&ctx()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    let origin = {
        let server = TestServer::start(FakeStore::new()).await.unwrap();
        server.origin()
    };
    // Give the aborted server task a moment to release the socket.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let api = HttpStoreApi::new(&ApiConfig::new(&origin).unwrap()).unwrap();
    let err = api.fetch_cart(&ctx()).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

// ============================================================================
// Headers
// ============================================================================

#[tokio::test]
async fn test_order_requires_idempotency_key() {
    let server = TestServer::start(FakeStore::new()).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/api/orders", server.origin()))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
