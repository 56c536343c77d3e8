//! Immutable view of the authoritative cart.

use std::collections::HashMap;
use std::num::NonZeroU32;

use serde::Serialize;
use tracing::warn;

use resale_core::{CartLineId, Price, ProductId};

use crate::api::{ApiError, CartLineRecord, Product};

/// One product held in the session's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    /// Product reserved by this line.
    pub product_id: ProductId,
    /// Server-assigned line ID. Lines only ever enter a snapshot from a
    /// server response, so the ID is always known.
    pub line_id: CartLineId,
    /// Reserved units, never zero.
    pub quantity: NonZeroU32,
    /// Product name at the last refetch.
    pub name: String,
    /// Brand.
    pub brand: Option<String>,
    /// Size label.
    pub size: Option<String>,
    /// Color name.
    pub color: Option<String>,
    /// Unit price at the last refetch.
    pub unit_price: Price,
    /// Image references.
    pub images: Vec<String>,
}

impl CartLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity.get())
    }

    fn from_record(
        record: CartLineRecord,
        listing: &HashMap<ProductId, &Product>,
    ) -> Result<Option<Self>, ApiError> {
        let quantity = match u32::try_from(record.quantity).ok().and_then(NonZeroU32::new) {
            Some(q) => q,
            None => {
                warn!(
                    line_id = %record.id,
                    quantity = record.quantity,
                    "Ignoring cart line with non-positive quantity"
                );
                return Ok(None);
            }
        };

        let product = record
            .product
            .as_ref()
            .or_else(|| listing.get(&record.product_id).copied())
            .ok_or_else(|| {
                ApiError::Malformed(format!(
                    "cart line {} has no product details for product {}",
                    record.id, record.product_id
                ))
            })?;

        Ok(Some(Self {
            product_id: record.product_id,
            line_id: record.id,
            quantity,
            name: product.name.clone(),
            brand: product.brand.clone(),
            size: product.size.clone(),
            color: product.color.clone(),
            unit_price: product.price,
            images: product.images.clone(),
        }))
    }
}

/// The last-known-good cart, replaced wholesale on every refetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    lines: Vec<CartLine>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a snapshot from a `GET cart` response.
    ///
    /// Display fields come from the nested product snapshot, falling back to
    /// the product listing. Lines with a non-positive quantity are dropped.
    /// Several lines for the same product are merged into one.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Malformed` if a line has no product details at all.
    pub fn from_records(
        records: Vec<CartLineRecord>,
        listing: &[Product],
    ) -> Result<Self, ApiError> {
        let listing: HashMap<ProductId, &Product> = listing.iter().map(|p| (p.id, p)).collect();
        let mut lines: Vec<CartLine> = Vec::with_capacity(records.len());

        for record in records {
            let Some(line) = CartLine::from_record(record, &listing)? else {
                continue;
            };
            if let Some(existing) = lines.iter_mut().find(|l| l.product_id == line.product_id) {
                warn!(
                    product_id = %line.product_id,
                    "Server returned several lines for one product, merging"
                );
                existing.quantity = existing.quantity.saturating_add(line.quantity.get());
            } else {
                lines.push(line);
            }
        }

        Ok(Self { lines })
    }

    /// Lines in server order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Units of `product_id` this session holds (0 if none).
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.line_for(product_id).map_or(0, |l| l.quantity.get())
    }

    /// Whether the cart holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity.get())).sum()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.lines.iter().map(CartLine::line_total).sum()
    }
}
