//! Product catalog with publication filtering.
//!
//! # Architecture
//!
//! - Listings come from `GET products?sessionId=S`, which carries
//!   reservation-aware availability for this session
//! - Every fetched listing is recorded in the [`AvailabilityModel`]
//! - Listings are cached with `moka` for a short TTL; the cache key includes
//!   the availability generation, so a cart mutation invalidates it

mod cache;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::{debug, instrument};

use resale_core::ProductId;

use crate::api::{ApiError, Product, StoreApi};
use crate::cart::AvailabilityModel;
use crate::context::SessionContext;
use crate::publication::PublicationClock;
use cache::{CacheKey, CacheValue};

/// Catalog client for one session.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    api: Arc<dyn StoreApi>,
    ctx: SessionContext,
    clock: PublicationClock,
    availability: AvailabilityModel,
    cache: Cache<CacheKey, CacheValue>,
}

impl Catalog {
    /// Create a catalog whose listings stay cached for `ttl`.
    #[must_use]
    pub fn new(
        api: Arc<dyn StoreApi>,
        ctx: SessionContext,
        clock: PublicationClock,
        availability: AvailabilityModel,
        ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(ttl)
            .build();

        Self {
            inner: Arc::new(CatalogInner {
                api,
                ctx,
                clock,
                availability,
                cache,
            }),
        }
    }

    /// The publication clock used for filtering.
    #[must_use]
    pub fn clock(&self) -> PublicationClock {
        self.inner.clock
    }

    /// Every product, published or not.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the listing cannot be fetched.
    #[instrument(skip(self), fields(session = %self.inner.ctx.session().redacted()))]
    pub async fn all_products(&self) -> Result<Arc<Vec<Product>>, ApiError> {
        let generation = self.inner.availability.generation();
        let cache_key = CacheKey::Products {
            session: self.inner.ctx.session().as_str().to_string(),
            generation,
        };

        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(self.inner.api.fetch_products(&self.inner.ctx).await?);
        self.inner
            .availability
            .record_all_at(products.iter(), generation);

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(Arc::clone(&products)))
            .await;

        Ok(products)
    }

    /// Products visible at `now`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the listing cannot be fetched.
    pub async fn visible_products(&self, now: DateTime<Utc>) -> Result<Vec<Product>, ApiError> {
        let clock = self.inner.clock;
        Ok(self
            .all_products()
            .await?
            .iter()
            .filter(|p| clock.is_product_visible(p, now))
            .cloned()
            .collect())
    }

    /// Products not yet visible at `now` (candidates for announcements).
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the listing cannot be fetched.
    pub async fn unpublished_products(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Product>, ApiError> {
        let clock = self.inner.clock;
        Ok(self
            .all_products()
            .await?
            .iter()
            .filter(|p| !clock.is_product_visible(p, now))
            .cloned()
            .collect())
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for unknown products.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ApiError> {
        let generation = self.inner.availability.generation();
        let cache_key = CacheKey::Product { id, generation };

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self.inner.api.fetch_product(&self.inner.ctx, id).await?;
        self.inner
            .availability
            .record_all_at([&product], generation);

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// Drop every cached listing.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

/// Products whose brand contains `needle`, case-insensitively. An empty
/// needle matches everything.
#[must_use]
pub fn filter_by_brand<'a>(products: &'a [Product], needle: &str) -> Vec<&'a Product> {
    let needle = needle.trim().to_lowercase();
    products
        .iter()
        .filter(|p| {
            needle.is_empty()
                || p.brand
                    .as_deref()
                    .is_some_and(|b| b.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use resale_core::{ReferenceZone, SessionToken};

    use super::*;
    use crate::testing::{FakeProduct, FakeStore, Op};

    fn catalog(fake: &FakeStore) -> Catalog {
        let ctx = SessionContext::new(SessionToken::parse("session_1_catalog").unwrap());
        Catalog::new(
            Arc::new(fake.clone()),
            ctx.clone(),
            PublicationClock::new(ReferenceZone::MOSCOW),
            AvailabilityModel::new(ctx),
            Duration::from_secs(30),
        )
    }

    fn fake() -> FakeStore {
        FakeStore::new()
            .with_product(FakeProduct::new(1, 500, 1).brand("Reima"))
            .with_product(
                FakeProduct::new(2, 700, 1)
                    .brand("Zara Kids")
                    .published_at("2025-03-01T10:00:00"),
            )
            .with_product(FakeProduct::new(3, 900, 1).published_at("garbage"))
    }

    fn ids(products: &[Product]) -> Vec<i64> {
        products.iter().map(|p| p.id.as_i64()).collect()
    }

    #[tokio::test]
    async fn test_visible_and_unpublished_partition() {
        let catalog = catalog(&fake());
        let before = Utc.with_ymd_and_hms(2025, 3, 1, 6, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap();

        assert_eq!(ids(&catalog.visible_products(before).await.unwrap()), vec![1, 3]);
        assert_eq!(ids(&catalog.unpublished_products(before).await.unwrap()), vec![2]);
        assert_eq!(ids(&catalog.visible_products(after).await.unwrap()), vec![1, 2, 3]);
        assert!(catalog.unpublished_products(after).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_is_cached_until_generation_changes() {
        let fake = fake();
        let catalog = catalog(&fake);

        catalog.all_products().await.unwrap();
        catalog.all_products().await.unwrap();
        assert_eq!(fake.calls(), 1);

        catalog.inner.availability.mark_stale();
        catalog.all_products().await.unwrap();
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_listing_records_availability() {
        let catalog = catalog(&fake());
        catalog.all_products().await.unwrap();

        let reported = catalog.inner.availability.reported(ProductId::new(1)).unwrap();
        assert_eq!(reported.available_quantity, Some(1));
    }

    #[tokio::test]
    async fn test_failed_listing_is_not_cached() {
        let fake = fake();
        let catalog = catalog(&fake);
        fake.fail_next(Op::FetchProducts, crate::testing::Fault::Malformed);

        assert!(catalog.all_products().await.is_err());
        assert!(catalog.all_products().await.is_ok());
    }

    #[tokio::test]
    async fn test_product_not_found() {
        let catalog = catalog(&fake());
        let err = catalog.product(ProductId::new(42)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_filter_by_brand() {
        let catalog = catalog(&fake());
        let products = catalog.all_products().await.unwrap();

        assert_eq!(filter_by_brand(&products, "zara").len(), 1);
        assert_eq!(filter_by_brand(&products, "  REIMA ").len(), 1);
        assert_eq!(filter_by_brand(&products, "").len(), 3);
        assert!(filter_by_brand(&products, "nike").is_empty());
    }
}
