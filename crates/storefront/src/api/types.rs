//! Wire types for the remote Cart/Product API.
//!
//! The server is not consistent about key casing (it has emitted both
//! `camelCase` and `PascalCase` payloads over time), so every field accepts
//! both spellings. Required fields are required by type: a product without an
//! `id` or `name` fails to deserialize and is reported as a malformed
//! response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resale_core::{
    AnnouncementId, CartLineId, DeliveryMethod, OrderId, OrderStatus, Price, ProductId,
    ReferenceZone,
};

use crate::publication::PublicationInstant;

// =============================================================================
// Product Types
// =============================================================================

/// A catalog product as reported by `GET products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product ID.
    #[serde(alias = "Id")]
    pub id: ProductId,
    /// Display name.
    #[serde(alias = "Name")]
    pub name: String,
    /// Brand.
    #[serde(default, alias = "Brand")]
    pub brand: Option<String>,
    /// Free-form description.
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    /// Unit price.
    #[serde(default, alias = "Price")]
    pub price: Price,
    /// Clothing size label.
    #[serde(default, alias = "Size")]
    pub size: Option<String>,
    /// Color name.
    #[serde(default, alias = "Color")]
    pub color: Option<String>,
    /// Image references (absolute URLs or server-relative paths).
    #[serde(default, alias = "Images")]
    pub images: Vec<String>,
    /// Total units the business holds.
    #[serde(
        default,
        alias = "StockQuantity",
        alias = "quantityInStock",
        alias = "QuantityInStock"
    )]
    pub stock_quantity: u32,
    /// Stock minus every session's reservation, when the server computed it.
    #[serde(default, alias = "AvailableQuantity")]
    pub available_quantity: Option<u32>,
    /// Raw scheduled publication timestamp; see [`Product::publication`].
    #[serde(default, alias = "PublishedAt")]
    pub published_at: Option<String>,
}

impl Product {
    /// Interpret `published_at` in the reference zone.
    #[must_use]
    pub fn publication(&self, zone: ReferenceZone) -> PublicationInstant {
        PublicationInstant::parse(self.published_at.as_deref(), zone)
    }

    /// Availability figures carried by this product payload.
    #[must_use]
    pub const fn availability(&self) -> Availability {
        Availability {
            stock_quantity: self.stock_quantity,
            available_quantity: self.available_quantity,
        }
    }

    /// First image reference resolved against the API origin.
    #[must_use]
    pub fn primary_image_url(&self, origin: &str) -> Option<String> {
        self.images
            .first()
            .map(|path| resolve_image_url(origin, path))
    }
}

/// Resolve an image reference: absolute URLs pass through, paths are joined to
/// the server origin.
#[must_use]
pub fn resolve_image_url(origin: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            origin.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Availability snapshot for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Availability {
    /// Total units the business holds.
    pub stock_quantity: u32,
    /// Units not reserved by any session, if reported.
    pub available_quantity: Option<u32>,
}

// =============================================================================
// Cart Types
// =============================================================================

/// One persisted cart line as reported by `GET cart` and the cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRecord {
    /// Server-assigned line ID.
    #[serde(alias = "lineId", alias = "LineId", alias = "Id")]
    pub id: CartLineId,
    /// Product this line reserves.
    #[serde(alias = "ProductId")]
    pub product_id: ProductId,
    /// Reserved units. Signed so that a bogus non-positive line can be
    /// detected instead of failing the whole payload.
    #[serde(alias = "Quantity")]
    pub quantity: i64,
    /// Denormalized product snapshot.
    #[serde(default, alias = "Product")]
    pub product: Option<Product>,
}

/// Body of `POST cart`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest<'a> {
    /// Session the reservation belongs to.
    pub session_id: &'a str,
    /// Product to add.
    pub product_id: ProductId,
    /// Units to add (create-or-increment is decided server-side).
    pub quantity: u32,
}

/// Body of `PUT cart/{lineId}`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCartLineRequest {
    /// New absolute quantity.
    pub quantity: u32,
}

// =============================================================================
// Order Types
// =============================================================================

/// Customer details attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCustomer {
    /// Customer name.
    pub name: String,
    /// Contact phone.
    pub phone: String,
    /// Optional email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional delivery address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// One ordered line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Ordered product.
    pub product_id: ProductId,
    /// Units.
    pub quantity: u32,
    /// Unit price at the time of ordering.
    pub unit_price: Price,
}

/// Body of `POST orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Session whose reservation becomes the order.
    pub session_id: String,
    /// Customer details.
    pub customer: OrderCustomer,
    /// Chosen delivery method.
    pub delivery_method: DeliveryMethod,
    /// Free-form comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Ordered lines.
    pub items: Vec<OrderItem>,
    /// Client-computed total, for the server to cross-check.
    pub total: Price,
}

/// An order acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    /// Order ID.
    #[serde(alias = "Id")]
    pub id: OrderId,
    /// Initial status.
    #[serde(default, alias = "Status")]
    pub status: OrderStatus,
    /// Server-computed total, if echoed.
    #[serde(default, alias = "Total")]
    pub total: Option<Price>,
}

// =============================================================================
// Announcement Types
// =============================================================================

/// A scheduled announcement as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    /// Announcement ID.
    #[serde(alias = "Id")]
    pub id: AnnouncementId,
    /// Message text.
    #[serde(alias = "Message")]
    pub message: String,
    /// Raw scheduled timestamp.
    #[serde(alias = "ScheduledAt")]
    pub scheduled_at: String,
    /// Products featured in the announcement.
    #[serde(default, alias = "ProductIds")]
    pub product_ids: Vec<ProductId>,
    /// Whether the server already sent it.
    #[serde(default, alias = "IsSent", alias = "sent")]
    pub is_sent: bool,
}

/// Body of `POST announcements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementRequest {
    /// Message text.
    pub message: String,
    /// Absolute send instant.
    pub scheduled_at: DateTime<Utc>,
    /// Featured products.
    pub product_ids: Vec<ProductId>,
}

/// Error body shapes the server uses for rejections.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default, alias = "Title")]
    pub title: Option<String>,
}
