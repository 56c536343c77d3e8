//! `reqwest` implementation of [`StoreApi`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use resale_core::{AnnouncementId, CartLineId, ProductId};

use super::types::{
    AddToCartRequest, Announcement, AnnouncementRequest, CartLineRecord, ErrorBody, OrderRequest,
    PlacedOrder, Product, UpdateCartLineRequest,
};
use super::{ApiError, StoreApi};
use crate::config::ApiConfig;
use crate::context::SessionContext;

/// Maximum number of body characters written to logs.
const LOG_BODY_LIMIT: usize = 500;

/// HTTP client for the remote Cart/Product API.
#[derive(Clone)]
pub struct HttpStoreApi {
    inner: Arc<HttpStoreApiInner>,
}

struct HttpStoreApiInner {
    client: reqwest::Client,
    /// Base URL ending in `/api/`.
    base_url: Url,
}

impl HttpStoreApi {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpStoreApiInner {
                client,
                base_url: config.api_base(),
            }),
        })
    }

    /// Base URL all endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    fn request(
        &self,
        ctx: &SessionContext,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(path)?;
        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(bearer) = ctx.bearer() {
            builder = builder.header("Authorization", bearer);
        }
        Ok(builder)
    }

    /// Send a request and return the raw success body.
    async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ApiError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if status.is_success() {
            return Ok(body);
        }

        tracing::error!(
            status = %status,
            body = %truncate(&body),
            "Store API returned non-success status"
        );

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound(rejection_message(status, &body)),
            _ => ApiError::Rejected {
                status: status.as_u16(),
                message: rejection_message(status, &body),
            },
        })
    }

    /// Send a request and decode the JSON success body.
    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let body = self.execute(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body),
                "Failed to parse Store API response"
            );
            ApiError::from(e)
        })
    }
}

#[async_trait]
impl StoreApi for HttpStoreApi {
    #[instrument(skip(self, ctx), fields(session = %ctx.session().redacted()))]
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Vec<CartLineRecord>, ApiError> {
        let builder = self
            .request(ctx, Method::GET, "cart")?
            .query(&[("sessionId", ctx.session().as_str())]);
        let lines: Vec<CartLineRecord> = self.execute_json(builder).await?;
        debug!(lines = lines.len(), "Fetched cart");
        Ok(lines)
    }

    #[instrument(skip(self, ctx), fields(session = %ctx.session().redacted(), product_id = %product_id))]
    async fn add_to_cart(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError> {
        let body = AddToCartRequest {
            session_id: ctx.session().as_str(),
            product_id,
            quantity,
        };
        let builder = self.request(ctx, Method::POST, "cart")?.json(&body);
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx), fields(line_id = %line_id))]
    async fn update_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError> {
        let builder = self
            .request(ctx, Method::PUT, &format!("cart/{line_id}"))?
            .json(&UpdateCartLineRequest { quantity });
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx), fields(line_id = %line_id))]
    async fn remove_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
    ) -> Result<(), ApiError> {
        let builder = self.request(ctx, Method::DELETE, &format!("cart/{line_id}"))?;
        self.execute(builder).await.map(drop)
    }

    #[instrument(skip(self, ctx), fields(session = %ctx.session().redacted()))]
    async fn clear_cart(&self, ctx: &SessionContext) -> Result<(), ApiError> {
        let builder = self
            .request(ctx, Method::DELETE, "cart")?
            .query(&[("sessionId", ctx.session().as_str())]);
        self.execute(builder).await.map(drop)
    }

    #[instrument(skip(self, ctx), fields(session = %ctx.session().redacted()))]
    async fn fetch_products(&self, ctx: &SessionContext) -> Result<Vec<Product>, ApiError> {
        let builder = self
            .request(ctx, Method::GET, "products")?
            .query(&[("sessionId", ctx.session().as_str())]);
        let products: Vec<Product> = self.execute_json(builder).await?;
        debug!(products = products.len(), "Fetched products");
        Ok(products)
    }

    #[instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn fetch_product(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
    ) -> Result<Product, ApiError> {
        let builder = self
            .request(ctx, Method::GET, &format!("products/{product_id}"))?
            .query(&[("sessionId", ctx.session().as_str())]);
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx, request), fields(items = request.items.len(), key = %idempotency_key))]
    async fn place_order(
        &self,
        ctx: &SessionContext,
        request: &OrderRequest,
        idempotency_key: Uuid,
    ) -> Result<PlacedOrder, ApiError> {
        let builder = self
            .request(ctx, Method::POST, "orders")?
            .header("Idempotency-Key", idempotency_key.to_string())
            .json(request);
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx))]
    async fn fetch_announcements(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<Announcement>, ApiError> {
        let builder = self.request(ctx, Method::GET, "announcements")?;
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx, request), fields(products = request.product_ids.len()))]
    async fn create_announcement(
        &self,
        ctx: &SessionContext,
        request: &AnnouncementRequest,
    ) -> Result<Announcement, ApiError> {
        let builder = self
            .request(ctx, Method::POST, "announcements")?
            .json(request);
        self.execute_json(builder).await
    }

    #[instrument(skip(self, ctx), fields(id = %id))]
    async fn delete_announcement(
        &self,
        ctx: &SessionContext,
        id: AnnouncementId,
    ) -> Result<(), ApiError> {
        let builder = self.request(ctx, Method::DELETE, &format!("announcements/{id}"))?;
        self.execute(builder).await.map(drop)
    }
}

/// Extract the human-readable reason from a rejection body.
fn rejection_message(status: StatusCode, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let non_blank = |m: &String| !m.trim().is_empty();
    parsed
        .message
        .filter(non_blank)
        .or_else(|| parsed.title.filter(non_blank))
        .or_else(|| {
            let text = body.trim();
            (!text.is_empty() && !text.starts_with('{') && text.len() <= 200)
                .then(|| text.to_string())
        })
        .unwrap_or_else(|| format!("Server error: {status}"))
}

fn truncate(body: &str) -> String {
    body.chars().take(LOG_BODY_LIMIT).collect()
}
