//! Cache types for product listings.

use std::sync::Arc;

use resale_core::ProductId;

use crate::api::Product;

/// Cache key. `generation` is the availability generation at fetch time, so
/// a cart mutation makes every earlier entry unreachable.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products { session: String, generation: u64 },
    Product { id: ProductId, generation: u64 },
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
}
