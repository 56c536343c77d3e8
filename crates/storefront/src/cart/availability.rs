//! Per-product availability ceilings.
//!
//! The server computes `availableQuantity` (stock minus every session's
//! reservation, the caller's own included). This model only remembers the
//! last reported value and forgets that it can be trusted the moment a
//! mutation is issued; a refetch is required before it is trusted again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use resale_core::ProductId;

use super::snapshot::CartSnapshot;
use crate::api::{Availability, Product};
use crate::context::SessionContext;

#[derive(Debug, Clone, Copy)]
struct Entry {
    availability: Availability,
    generation: u64,
}

/// Availability figures reported for this session's product listing.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct AvailabilityModel {
    inner: Arc<AvailabilityInner>,
}

struct AvailabilityInner {
    ctx: SessionContext,
    entries: RwLock<HashMap<ProductId, Entry>>,
    generation: AtomicU64,
}

impl AvailabilityModel {
    /// An empty model for the given session.
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(AvailabilityInner {
                ctx,
                entries: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current generation; bumped by every [`Self::mark_stale`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Distrust every recorded value until the next refetch.
    pub fn mark_stale(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            session = %self.inner.ctx.session().redacted(),
            generation,
            "Availability marked stale"
        );
    }

    /// Record products fetched now.
    pub fn record_all<'a>(&self, products: impl IntoIterator<Item = &'a Product>) {
        self.record_all_at(products, self.generation());
    }

    /// Record products whose fetch started at `generation`. If a mutation was
    /// issued since, the values are stored but stay stale.
    pub fn record_all_at<'a>(
        &self,
        products: impl IntoIterator<Item = &'a Product>,
        generation: u64,
    ) {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for product in products {
            let keep_existing = entries
                .get(&product.id)
                .is_some_and(|e| e.generation > generation);
            if !keep_existing {
                entries.insert(
                    product.id,
                    Entry {
                        availability: product.availability(),
                        generation,
                    },
                );
            }
        }
    }

    /// The last reported availability for `product_id`, if it is fresh.
    #[must_use]
    pub fn reported(&self, product_id: ProductId) -> Option<Availability> {
        let current = self.generation();
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product_id)
            .filter(|e| e.generation == current)
            .map(|e| e.availability)
    }

    /// The largest line quantity this session may hold for `product`.
    ///
    /// With a fresh server figure this is the unreserved stock plus what the
    /// session already holds, capped by total stock. Without one it falls
    /// back to the raw stock, which is permissive until the next refetch.
    #[must_use]
    pub fn ceiling(&self, product: &Product, cart: &CartSnapshot) -> u32 {
        let fresh = self.reported(product.id);
        let stock = fresh.map_or(product.stock_quantity, |a| a.stock_quantity);
        match fresh.and_then(|a| a.available_quantity) {
            Some(available) => {
                let own = cart.quantity_of(product.id);
                available.saturating_add(own).min(stock.max(own))
            }
            None => stock,
        }
    }

    /// The ceiling for a product known only by ID, if a fresh figure exists.
    #[must_use]
    pub fn ceiling_for(&self, product_id: ProductId, cart: &CartSnapshot) -> Option<u32> {
        let fresh = self.reported(product_id)?;
        let own = cart.quantity_of(product_id);
        let ceiling = fresh.available_quantity.map_or(fresh.stock_quantity, |available| {
            available.saturating_add(own).min(fresh.stock_quantity.max(own))
        });
        Some(ceiling)
    }

    /// How many more units the session may add.
    #[must_use]
    pub fn remaining(&self, product: &Product, cart: &CartSnapshot) -> u32 {
        self.ceiling(product, cart)
            .saturating_sub(cart.quantity_of(product.id))
    }

    /// Whether adding one more unit is permitted.
    #[must_use]
    pub fn can_add_one(&self, product: &Product, cart: &CartSnapshot) -> bool {
        self.ceiling(product, cart) > cart.quantity_of(product.id)
    }
}

impl std::fmt::Debug for AvailabilityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityModel")
            .field("session", self.inner.ctx.session())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
