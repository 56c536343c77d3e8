//! Remote Cart/Product API.
//!
//! # Architecture
//!
//! - The server is the source of truth for carts, reservations and stock;
//!   nothing here caches cart state
//! - [`StoreApi`] is the seam the rest of the crate talks to; [`HttpStoreApi`]
//!   implements it over `reqwest`, the test fake implements it in memory
//! - Every call receives the [`SessionContext`] explicitly; the session token
//!   scopes the cart and the optional credential is attached as a bearer token
//!
//! # Endpoints
//!
//! - `GET cart?sessionId=S`, `POST cart`, `PUT cart/{lineId}`,
//!   `DELETE cart/{lineId}`, `DELETE cart?sessionId=S`
//! - `GET products?sessionId=S`, `GET products/{id}`
//! - `POST orders`
//! - `GET announcements`, `POST announcements`, `DELETE announcements/{id}`

mod http;
pub mod types;

pub use http::HttpStoreApi;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use resale_core::{AnnouncementId, CartLineId, ProductId};

use crate::context::SessionContext;

/// Errors that can occur when talking to the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable response reached the client.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server explicitly declined the request.
    #[error("Rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided reason.
        message: String,
    },

    /// The credential was missing or rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response did not match the expected contract.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

impl ApiError {
    /// Whether the failure means "no trustworthy answer" rather than an
    /// explicit server decision. Malformed responses count as transport
    /// failures: partial data is never trusted. So do 5xx responses, which
    /// report an outage rather than a decision about the request.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Malformed(_) | Self::RateLimited(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::Unauthorized | Self::NotFound(_) => false,
        }
    }

    /// Whether the server declined because of insufficient stock.
    ///
    /// A 409 always means a stock conflict. A 400 or 422 counts only when
    /// its reason names stock as a whole word.
    #[must_use]
    pub fn is_insufficient_stock(&self) -> bool {
        match self {
            Self::Rejected { status: 409, .. } => true,
            Self::Rejected {
                status: 400 | 422,
                message,
            } => message
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| {
                    word.eq_ignore_ascii_case("stock") || word.eq_ignore_ascii_case("available")
                }),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The remote Cart/Product API contract.
///
/// Implementations must not retry: a failed request surfaces once and the
/// user re-triggers the action.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// `GET cart?sessionId=S`.
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Vec<CartLineRecord>, ApiError>;

    /// `POST cart` with create-or-increment semantics decided server-side.
    async fn add_to_cart(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError>;

    /// `PUT cart/{lineId}` with a new absolute quantity.
    async fn update_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError>;

    /// `DELETE cart/{lineId}`.
    async fn remove_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
    ) -> Result<(), ApiError>;

    /// `DELETE cart?sessionId=S`.
    async fn clear_cart(&self, ctx: &SessionContext) -> Result<(), ApiError>;

    /// `GET products?sessionId=S`, with reservation-aware availability.
    async fn fetch_products(&self, ctx: &SessionContext) -> Result<Vec<Product>, ApiError>;

    /// `GET products/{id}`.
    async fn fetch_product(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
    ) -> Result<Product, ApiError>;

    /// `POST orders`. The idempotency key makes a double-submit harmless.
    async fn place_order(
        &self,
        ctx: &SessionContext,
        request: &OrderRequest,
        idempotency_key: Uuid,
    ) -> Result<PlacedOrder, ApiError>;

    /// `GET announcements`.
    async fn fetch_announcements(&self, ctx: &SessionContext)
    -> Result<Vec<Announcement>, ApiError>;

    /// `POST announcements`.
    async fn create_announcement(
        &self,
        ctx: &SessionContext,
        request: &AnnouncementRequest,
    ) -> Result<Announcement, ApiError>;

    /// `DELETE announcements/{id}`.
    async fn delete_announcement(
        &self,
        ctx: &SessionContext,
        id: AnnouncementId,
    ) -> Result<(), ApiError>;
}
