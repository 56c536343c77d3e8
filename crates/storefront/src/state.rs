//! One shopper's (or operator's) storefront, wired together.

use std::sync::Arc;
use std::time::Duration;

use crate::announcements::Announcements;
use crate::api::{ApiError, HttpStoreApi, StoreApi};
use crate::cart::{AvailabilityModel, CartStore, MutationPolicy};
use crate::catalog::Catalog;
use crate::checkout::CheckoutFlow;
use crate::config::StorefrontConfig;
use crate::context::SessionContext;
use crate::publication::PublicationClock;
use crate::session::SessionIdentity;

/// The storefront components for one session.
///
/// Cheaply cloneable via `Arc`. The cart, catalog and checkout all share one
/// [`SessionContext`] and one [`AvailabilityModel`], so a cart mutation
/// also retires cached catalog listings.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    identity: SessionIdentity,
    ctx: SessionContext,
    cart: CartStore,
    catalog: Catalog,
    checkout: CheckoutFlow,
    announcements: Announcements,
}

impl Storefront {
    /// Connect to the configured API with the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ApiError> {
        let api = Arc::new(HttpStoreApi::new(&config.api)?);
        let identity = SessionIdentity::file(&config.session_file);
        Ok(Self::with_api(config, api, identity))
    }

    /// Build on any API implementation.
    #[must_use]
    pub fn with_api(
        config: StorefrontConfig,
        api: Arc<dyn StoreApi>,
        identity: SessionIdentity,
    ) -> Self {
        let ctx = SessionContext::with_credential(
            identity.get_or_create(),
            config.api_token.clone(),
        );
        let clock = PublicationClock::new(config.zone);
        let availability = AvailabilityModel::new(ctx.clone());

        let cart = CartStore::new(
            Arc::clone(&api),
            ctx.clone(),
            availability.clone(),
            MutationPolicy::Queue,
        );
        let catalog = Catalog::new(
            Arc::clone(&api),
            ctx.clone(),
            clock,
            availability,
            Duration::from_secs(config.catalog_cache_ttl_secs),
        );
        let checkout = CheckoutFlow::new(Arc::clone(&api), cart.clone());
        let announcements = Announcements::new(api, ctx.clone(), clock);

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                identity,
                ctx,
                cart,
                catalog,
                checkout,
                announcements,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.inner.ctx
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutFlow {
        &self.inner.checkout
    }

    #[must_use]
    pub fn announcements(&self) -> &Announcements {
        &self.inner.announcements
    }
}
