//! Integration tests for the resale storefront client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p resale-integration-tests
//! ```
//!
//! No external services are needed: [`TestServer`] serves the remote
//! Cart/Product API over real HTTP on an ephemeral local port, backed by the
//! in-memory `FakeStore`, and the tests drive the real `HttpStoreApi`
//! against it.
//!
//! # Test Categories
//!
//! - `http_client` - Wire format, status mapping and headers
//! - `cart_sync` - Cart reconciliation across sessions over HTTP
//! - `checkout_and_announcements` - Orders and operator endpoints over HTTP

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

use resale_core::{AnnouncementId, CartLineId, ProductId, SessionToken};
use resale_storefront::api::{
    Announcement, AnnouncementRequest, ApiError, CartLineRecord, OrderRequest, PlacedOrder,
    Product, StoreApi,
};
use resale_storefront::config::{ConfigError, StorefrontConfig};
use resale_storefront::context::SessionContext;
use resale_storefront::testing::FakeStore;

/// Session used for line-addressed requests, which carry no session ID.
const LINE_SESSION: &str = "session_0_line";

/// A running HTTP server. Stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Serve the Cart/Product API backed by `fake`.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start(fake: FakeStore) -> std::io::Result<Self> {
        Self::serve(router(fake)).await
    }

    /// Serve an arbitrary router, for hand-written responses.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn serve(router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(Self { addr, task })
    }

    /// Server origin, e.g. `http://127.0.0.1:49152`.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is rejected.
    pub fn config(&self, session_file: PathBuf) -> Result<StorefrontConfig, ConfigError> {
        StorefrontConfig::for_origin(&self.origin(), session_file)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Routes of the remote API under `/api`.
pub fn router(fake: FakeStore) -> Router {
    Router::new()
        .route("/api/cart", get(fetch_cart).post(add_to_cart).delete(clear_cart))
        .route(
            "/api/cart/{line_id}",
            put(update_cart_line).delete(remove_cart_line),
        )
        .route("/api/products", get(fetch_products))
        .route("/api/products/{product_id}", get(fetch_product))
        .route("/api/orders", axum::routing::post(place_order))
        .route(
            "/api/announcements",
            get(fetch_announcements).post(create_announcement),
        )
        .route("/api/announcements/{id}", delete(delete_announcement))
        .with_state(fake)
}

// =============================================================================
// Error Mapping
// =============================================================================

/// An [`ApiError`] rendered the way the real server reports it.
struct Failure(ApiError);

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        match self.0 {
            ApiError::Rejected { status, message } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
                Json(json!({ "message": message })),
            )
                .into_response(),
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::RateLimited(secs) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
            )
                .into_response(),
            // A well-formed status with a body that matches no contract.
            ApiError::Malformed(_) => {
                (StatusCode::OK, Json(json!({ "unexpected": true }))).into_response()
            }
            ApiError::Transport(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, message).into_response()
            }
        }
    }
}

fn bad_request(message: &str) -> Failure {
    Failure(ApiError::Rejected {
        status: 400,
        message: message.to_string(),
    })
}

// =============================================================================
// Request Context
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionQuery {
    session_id: String,
}

fn context(session_id: &str, headers: &HeaderMap) -> Result<SessionContext, Failure> {
    let session =
        SessionToken::parse(session_id).map_err(|_| bad_request("Invalid sessionId"))?;
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| SecretString::from(token.to_string()));
    Ok(SessionContext::with_credential(session, credential))
}

// =============================================================================
// Handlers
// =============================================================================

async fn fetch_cart(
    State(fake): State<FakeStore>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<CartLineRecord>>, Failure> {
    let ctx = context(&query.session_id, &headers)?;
    Ok(Json(fake.fetch_cart(&ctx).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    session_id: String,
    product_id: ProductId,
    quantity: u32,
}

async fn add_to_cart(
    State(fake): State<FakeStore>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Result<Json<CartLineRecord>, Failure> {
    let ctx = context(&body.session_id, &headers)?;
    Ok(Json(
        fake.add_to_cart(&ctx, body.product_id, body.quantity)
            .await?,
    ))
}

#[derive(Deserialize)]
struct UpdateBody {
    quantity: u32,
}

async fn update_cart_line(
    State(fake): State<FakeStore>,
    Path(line_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> Result<Json<CartLineRecord>, Failure> {
    let ctx = context(LINE_SESSION, &headers)?;
    Ok(Json(
        fake.update_cart_line(&ctx, CartLineId::new(line_id), body.quantity)
            .await?,
    ))
}

async fn remove_cart_line(
    State(fake): State<FakeStore>,
    Path(line_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, Failure> {
    let ctx = context(LINE_SESSION, &headers)?;
    fake.remove_cart_line(&ctx, CartLineId::new(line_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(
    State(fake): State<FakeStore>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<StatusCode, Failure> {
    let ctx = context(&query.session_id, &headers)?;
    fake.clear_cart(&ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_products(
    State(fake): State<FakeStore>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, Failure> {
    let ctx = context(&query.session_id, &headers)?;
    Ok(Json(fake.fetch_products(&ctx).await?))
}

async fn fetch_product(
    State(fake): State<FakeStore>,
    Path(product_id): Path<i64>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<Product>, Failure> {
    let ctx = context(&query.session_id, &headers)?;
    Ok(Json(
        fake.fetch_product(&ctx, ProductId::new(product_id))
            .await?,
    ))
}

async fn place_order(
    State(fake): State<FakeStore>,
    headers: HeaderMap,
    Json(request): Json<OrderRequest>,
) -> Result<Json<PlacedOrder>, Failure> {
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| bad_request("Idempotency-Key header is required"))?;
    let ctx = context(&request.session_id, &headers)?;
    Ok(Json(fake.place_order(&ctx, &request, key).await?))
}

async fn fetch_announcements(
    State(fake): State<FakeStore>,
    headers: HeaderMap,
) -> Result<Json<Vec<Announcement>>, Failure> {
    let ctx = context(LINE_SESSION, &headers)?;
    Ok(Json(fake.fetch_announcements(&ctx).await?))
}

async fn create_announcement(
    State(fake): State<FakeStore>,
    headers: HeaderMap,
    Json(request): Json<AnnouncementRequest>,
) -> Result<Json<Announcement>, Failure> {
    let ctx = context(LINE_SESSION, &headers)?;
    Ok(Json(fake.create_announcement(&ctx, &request).await?))
}

async fn delete_announcement(
    State(fake): State<FakeStore>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, Failure> {
    let ctx = context(LINE_SESSION, &headers)?;
    fake.delete_announcement(&ctx, AnnouncementId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
