//! The cart reconciliation engine.
//!
//! Every mutation funnels through [`CartStore::reconcile`]:
//!
//! 1. wait for (or, under [`MutationPolicy::Reject`], refuse) the session's
//!    mutation gate, so at most one mutation is in flight;
//! 2. resolve the server line ID, refetching once if it is unknown;
//! 3. check the request against a fresh availability ceiling;
//! 4. mark availability stale and send exactly one request;
//! 5. refetch the authoritative cart and replace the snapshot wholesale.
//!
//! The response to a mutation is never applied locally. Only `GET cart`
//! output ever becomes the snapshot.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use resale_core::{CartLineId, Price, ProductId};

use super::availability::AvailabilityModel;
use super::snapshot::{CartLine, CartSnapshot};
use crate::api::{ApiError, Product, StoreApi};
use crate::context::SessionContext;
use crate::error::CartError;

/// Where the store is in its mutation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartPhase {
    /// Last-known-good snapshot held, nothing in flight.
    Idle,
    /// One mutation request is in flight.
    Mutating,
    /// The mutation settled; the authoritative cart is being refetched.
    Reconciling,
}

/// What happens to a mutation requested while another is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPolicy {
    /// Wait for the in-flight mutation, then run.
    #[default]
    Queue,
    /// Fail immediately with [`CartError::Busy`].
    Reject,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Add(ProductId),
    SetQuantity(ProductId, NonZeroU32),
    Remove(ProductId),
    Clear,
}

impl Mutation {
    const fn product_id(self) -> Option<ProductId> {
        match self {
            Self::Add(id) | Self::SetQuantity(id, _) | Self::Remove(id) => Some(id),
            Self::Clear => None,
        }
    }
}

/// What to do with the snapshot when a refetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFetchFailure {
    /// Replace with an empty cart ("failed to load" reads as "empty").
    Empty,
    /// Keep the last-known-good snapshot.
    Keep,
}

/// Outcome of the request phase of a mutation.
enum Sent {
    /// A request reached the server (accepted).
    Accepted,
    /// Nothing needed sending.
    Noop,
}

struct AppliedSnapshot {
    seq: u64,
    snapshot: Arc<CartSnapshot>,
}

/// Holds the session's cart and keeps it converged with the server.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    api: Arc<dyn StoreApi>,
    ctx: SessionContext,
    availability: AvailabilityModel,
    policy: MutationPolicy,
    applied: RwLock<AppliedSnapshot>,
    fetch_seq: AtomicU64,
    gate: Mutex<()>,
    phase: watch::Sender<CartPhase>,
}

impl CartStore {
    /// A store with an empty snapshot. Call [`Self::load`] to populate it.
    #[must_use]
    pub fn new(
        api: Arc<dyn StoreApi>,
        ctx: SessionContext,
        availability: AvailabilityModel,
        policy: MutationPolicy,
    ) -> Self {
        let (phase, _) = watch::channel(CartPhase::Idle);
        Self {
            inner: Arc::new(CartStoreInner {
                api,
                ctx,
                availability,
                policy,
                applied: RwLock::new(AppliedSnapshot {
                    seq: 0,
                    snapshot: Arc::new(CartSnapshot::empty()),
                }),
                fetch_seq: AtomicU64::new(0),
                gate: Mutex::new(()),
                phase,
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The current snapshot. Never mid-replacement.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<CartSnapshot> {
        Arc::clone(
            &self
                .inner
                .applied
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot,
        )
    }

    /// Sum of line totals in the current snapshot.
    #[must_use]
    pub fn total_price(&self) -> Price {
        self.current_snapshot().total_price()
    }

    /// Sum of line quantities in the current snapshot.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.current_snapshot().total_units()
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> CartPhase {
        *self.inner.phase.borrow()
    }

    /// Watch phase transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartPhase> {
        self.inner.phase.subscribe()
    }

    /// The availability model this store keeps fresh.
    #[must_use]
    pub fn availability(&self) -> &AvailabilityModel {
        &self.inner.availability
    }

    /// The session this cart belongs to.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.inner.ctx
    }

    /// Largest line quantity the session may hold for `product`.
    #[must_use]
    pub fn ceiling(&self, product: &Product) -> u32 {
        self.inner
            .availability
            .ceiling(product, &self.current_snapshot())
    }

    /// Fetch the authoritative cart and replace the snapshot.
    ///
    /// Product availability is refetched alongside. On failure the snapshot
    /// is emptied and the failure returned.
    ///
    /// # Errors
    ///
    /// Returns `CartError` if the cart could not be fetched or decoded.
    #[instrument(skip(self), fields(session = %self.inner.ctx.session().redacted()))]
    pub async fn load(&self) -> Result<Arc<CartSnapshot>, CartError> {
        self.refresh(OnFetchFailure::Empty).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::MissingProductId` without a network call if the
    /// product has no server identity, `CartError::Unavailable` if no unit
    /// is left, or the server's rejection.
    pub async fn add(&self, product: &Product) -> Result<Arc<CartSnapshot>, CartError> {
        self.add_by_id(product.id).await
    }

    /// Add one unit of the product with `product_id`.
    ///
    /// # Errors
    ///
    /// See [`Self::add`].
    pub async fn add_by_id(&self, product_id: ProductId) -> Result<Arc<CartSnapshot>, CartError> {
        if !product_id.is_valid() {
            return Err(CartError::MissingProductId);
        }
        self.run(Mutation::Add(product_id)).await
    }

    /// Set the line quantity for `product_id`; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the session holds no line for the
    /// product, `CartError::Unavailable` if the quantity exceeds the fresh
    /// ceiling, or the server's rejection.
    pub async fn set_quantity(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Arc<CartSnapshot>, CartError> {
        if quantity <= 0 {
            return self.remove(product_id).await;
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(CartError::InvalidQuantity(quantity))?;
        self.run(Mutation::SetQuantity(product_id, quantity)).await
    }

    /// Remove the line for `product_id`. A product not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn remove(&self, product_id: ProductId) -> Result<Arc<CartSnapshot>, CartError> {
        self.run(Mutation::Remove(product_id)).await
    }

    /// Empty the whole cart.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn clear(&self) -> Result<Arc<CartSnapshot>, CartError> {
        self.run(Mutation::Clear).await
    }

    /// Run a mutation to completion even if the caller stops waiting: once a
    /// request is issued its server-side effect cannot be retracted, so the
    /// refetch must still happen.
    async fn run(&self, mutation: Mutation) -> Result<Arc<CartSnapshot>, CartError> {
        let store = self.clone();
        tokio::spawn(async move { store.reconcile(mutation).await })
            .await
            .map_err(|e| CartError::Transport(format!("cart task failed: {e}")))?
    }

    #[instrument(
        skip(self),
        fields(session = %self.inner.ctx.session().redacted())
    )]
    async fn reconcile(&self, mutation: Mutation) -> Result<Arc<CartSnapshot>, CartError> {
        let _gate = match self.inner.policy {
            MutationPolicy::Queue => self.inner.gate.lock().await,
            MutationPolicy::Reject => self.inner.gate.try_lock().map_err(|_| {
                debug!("Rejecting mutation while another is in flight");
                CartError::Busy
            })?,
        };
        let _phase = PhaseGuard::enter(&self.inner.phase, CartPhase::Mutating);

        let sent = self.send(mutation).await;

        match sent {
            Ok(Sent::Noop) => Ok(self.current_snapshot()),
            Ok(Sent::Accepted) => {
                self.inner.phase.send_replace(CartPhase::Reconciling);
                self.refresh(OnFetchFailure::Empty)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Mutation accepted but refetch failed");
                        CartError::RefreshFailed(e.to_string())
                    })
            }
            Err(Failure::Local(e)) => Err(e),
            Err(Failure::Remote(e)) => {
                self.inner.phase.send_replace(CartPhase::Reconciling);
                if let Err(refetch) = self.refresh(OnFetchFailure::Keep).await {
                    debug!(error = %refetch, "Refetch after failed mutation also failed");
                }
                Err(e)
            }
        }
    }

    /// Resolve, pre-check and send one mutation request.
    async fn send(&self, mutation: Mutation) -> Result<Sent, Failure> {
        let api = &self.inner.api;
        let ctx = &self.inner.ctx;
        let product_id = mutation.product_id();

        match mutation {
            Mutation::Add(id) => {
                let snapshot = self.current_snapshot();
                if let Some(ceiling) = self.inner.availability.ceiling_for(id, &snapshot)
                    && ceiling <= snapshot.quantity_of(id)
                {
                    return Err(Failure::Local(CartError::Unavailable {
                        product_id: id,
                        message: "No more units of this product are available".to_string(),
                    }));
                }
                self.inner.availability.mark_stale();
                let line = api
                    .add_to_cart(ctx, id, 1)
                    .await
                    .map_err(|e| self.remote(e, product_id))?;
                debug!(line_id = %line.id, "Add accepted");
            }
            Mutation::SetQuantity(id, quantity) => {
                let Some((line_id, snapshot)) = self.resolve_line(id).await? else {
                    return Err(Failure::Local(CartError::NotInCart(id)));
                };
                if let Some(ceiling) = self.inner.availability.ceiling_for(id, &snapshot)
                    && quantity.get() > ceiling
                    && quantity.get() > snapshot.quantity_of(id)
                {
                    return Err(Failure::Local(CartError::Unavailable {
                        product_id: id,
                        message: format!("Only {ceiling} available"),
                    }));
                }
                self.inner.availability.mark_stale();
                let line = api
                    .update_cart_line(ctx, line_id, quantity.get())
                    .await
                    .map_err(|e| self.remote(e, product_id))?;
                debug!(line_id = %line.id, quantity = line.quantity, "Update accepted");
            }
            Mutation::Remove(id) => {
                let Some((line_id, _)) = self.resolve_line(id).await? else {
                    debug!(product_id = %id, "Remove of absent product is a no-op");
                    return Ok(Sent::Noop);
                };
                self.inner.availability.mark_stale();
                api.remove_cart_line(ctx, line_id)
                    .await
                    .map_err(|e| self.remote(e, product_id))?;
            }
            Mutation::Clear => {
                self.inner.availability.mark_stale();
                api.clear_cart(ctx)
                    .await
                    .map_err(|e| self.remote(e, None))?;
            }
        }

        info!(?mutation, "Cart mutation accepted");
        Ok(Sent::Accepted)
    }

    /// The server line ID for `product_id`, refetching once if unknown.
    async fn resolve_line(
        &self,
        product_id: ProductId,
    ) -> Result<Option<(CartLineId, Arc<CartSnapshot>)>, Failure> {
        let snapshot = self.current_snapshot();
        if let Some(line) = snapshot.line_for(product_id) {
            return Ok(Some((line.line_id, Arc::clone(&snapshot))));
        }

        debug!(product_id = %product_id, "Line unknown, refetching to discover it");
        let snapshot = self
            .refresh(OnFetchFailure::Keep)
            .await
            .map_err(Failure::Local)?;
        Ok(snapshot
            .line_for(product_id)
            .map(|line: &CartLine| (line.line_id, Arc::clone(&snapshot))))
    }

    fn remote(&self, err: ApiError, product_id: Option<ProductId>) -> Failure {
        if matches!(err, ApiError::Unauthorized) {
            self.inner.ctx.clear_credential();
        }
        warn!(error = %err, "Cart mutation failed");
        Failure::Remote(CartError::from_api(err, product_id))
    }

    // =========================================================================
    // Refetch
    // =========================================================================

    async fn refresh(&self, on_failure: OnFetchFailure) -> Result<Arc<CartSnapshot>, CartError> {
        let seq = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.inner.availability.generation();
        let api = &self.inner.api;
        let ctx = &self.inner.ctx;

        let (cart, products) = tokio::join!(api.fetch_cart(ctx), api.fetch_products(ctx));

        let products = products
            .inspect_err(|e| warn!(error = %e, "Product availability refetch failed"))
            .unwrap_or_default();

        let fetched = cart.and_then(|records| CartSnapshot::from_records(records, &products));

        match fetched {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let listing = Some((products.as_slice(), generation));
                if self.apply(seq, Arc::clone(&snapshot), listing) {
                    debug!(
                        lines = snapshot.lines().len(),
                        units = snapshot.total_units(),
                        "Cart snapshot replaced"
                    );
                    Ok(snapshot)
                } else {
                    Ok(self.current_snapshot())
                }
            }
            Err(err) => {
                if matches!(err, ApiError::Unauthorized) {
                    self.inner.ctx.clear_credential();
                }
                warn!(error = %err, "Cart load failed");
                if on_failure == OnFetchFailure::Empty {
                    self.apply(seq, Arc::new(CartSnapshot::empty()), None);
                }
                Err(CartError::from(err))
            }
        }
    }

    /// Install `snapshot` if no newer fetch has been applied. Returns whether
    /// it was installed.
    fn apply(
        &self,
        seq: u64,
        snapshot: Arc<CartSnapshot>,
        products: Option<(&[Product], u64)>,
    ) -> bool {
        let mut applied = self
            .inner
            .applied
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if seq <= applied.seq {
            debug!(seq, applied = applied.seq, "Discarding out-of-order cart response");
            return false;
        }
        if let Some((products, generation)) = products {
            self.inner.availability.record_all_at(products, generation);
        }
        applied.seq = seq;
        applied.snapshot = snapshot;
        true
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("session", self.inner.ctx.session())
            .field("policy", &self.inner.policy)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

enum Failure {
    /// Refused before anything was sent.
    Local(CartError),
    /// The server or transport failed the request.
    Remote(CartError),
}

/// Resets the phase to `Idle` however the mutation ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<CartPhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<CartPhase>, state: CartPhase) -> Self {
        phase.send_replace(state);
        Self { phase }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(CartPhase::Idle);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use resale_core::SessionToken;

    use super::*;
    use crate::testing::{FakeProduct, FakeStore, Fault, Op};

    fn ctx(name: &str) -> SessionContext {
        SessionContext::new(SessionToken::parse(&format!("session_1_{name}")).unwrap())
    }

    fn store_for(fake: &FakeStore, name: &str, policy: MutationPolicy) -> CartStore {
        let ctx = ctx(name);
        CartStore::new(
            Arc::new(fake.clone()),
            ctx.clone(),
            AvailabilityModel::new(ctx),
            policy,
        )
    }

    fn store(fake: &FakeStore) -> CartStore {
        store_for(fake, "a", MutationPolicy::Queue)
    }

    fn pid(id: i64) -> ProductId {
        ProductId::new(id)
    }

    // =========================================================================
    // Load
    // =========================================================================

    #[tokio::test]
    async fn test_load_replaces_snapshot() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 3));
        let store = store(&fake);
        fake.seed_line(store.context().session(), pid(1), 2);

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.total_units(), 2);
        assert_eq!(store.total_price(), Price::from_units(1000));
    }

    #[tokio::test]
    async fn test_load_failure_empties_snapshot() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 3));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();
        assert_eq!(store.total_units(), 1);

        fake.fail_next(Op::FetchCart, Fault::Transport);
        let err = store.load().await.unwrap_err();
        assert!(err.is_transport());
        assert!(store.current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_cart_is_treated_as_transport_failure() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 3));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();

        fake.fail_next(Op::FetchCart, Fault::Malformed);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, CartError::Transport(_)));
        assert!(store.current_snapshot().is_empty());
    }

    // =========================================================================
    // Add
    // =========================================================================

    #[tokio::test]
    async fn test_add_without_identity_makes_no_call() {
        let fake = FakeStore::new();
        let store = store(&fake);

        let err = store.add_by_id(pid(0)).await.unwrap_err();
        assert!(matches!(err, CartError::MissingProductId));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_add_increments_existing_line() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);

        store.add_by_id(pid(1)).await.unwrap();
        let snapshot = store.add_by_id(pid(1)).await.unwrap();

        assert_eq!(snapshot.lines().len(), 1);
        assert_eq!(snapshot.quantity_of(pid(1)), 2);
    }

    #[tokio::test]
    async fn test_add_rejected_leaves_snapshot_untouched() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 1));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();
        let before = store.current_snapshot();

        // The fresh ceiling already says no: refused locally.
        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(matches!(err, CartError::Unavailable { .. }));
        assert_eq!(*store.current_snapshot(), *before);
    }

    #[tokio::test]
    async fn test_add_rejected_by_server_surfaces_reason() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 1));
        let store = store(&fake);
        // No load yet: the ceiling is unknown, so the server decides.
        fake.seed_line(&SessionToken::parse("session_1_other").unwrap(), pid(1), 1);

        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(matches!(err, CartError::Unavailable { .. }));
        assert!(!err.user_message().is_empty());
        assert!(store.current_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_add_transport_failure_keeps_last_known_good() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();

        fake.fail_next(Op::AddToCart, Fault::Transport);
        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(store.current_snapshot().quantity_of(pid(1)), 1);
        assert_eq!(store.phase(), CartPhase::Idle);
    }

    #[tokio::test]
    async fn test_add_during_outage_is_not_reported_as_sold_out() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();

        fake.fail_next(
            Op::AddToCart,
            Fault::Rejected {
                status: 503,
                message: "Server error: 503 Service Unavailable".to_string(),
            },
        );
        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(matches!(err, CartError::Transport(_)));
        assert_eq!(err.user_message(), "Could not reach the shop. Please try again.");
        assert_eq!(store.current_snapshot().quantity_of(pid(1)), 1);
    }

    #[tokio::test]
    async fn test_accepted_add_with_failed_refetch_reports_refresh_failure() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);

        fake.fail_next(Op::FetchCart, Fault::Transport);
        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(matches!(err, CartError::RefreshFailed(_)));
        assert!(store.current_snapshot().is_empty());
        assert_eq!(fake.server_units(store.context().session()).await, 1);
    }

    // =========================================================================
    // Set quantity / remove / clear
    // =========================================================================

    #[tokio::test]
    async fn test_set_quantity_total_price() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);

        store.add_by_id(pid(1)).await.unwrap();
        store.set_quantity(pid(1), 3).await.unwrap();

        assert_eq!(store.total_price(), Price::from_units(1500));
        assert_eq!(store.total_units(), 3);
    }

    #[tokio::test]
    async fn test_set_quantity_discovers_unknown_line() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);
        fake.seed_line(store.context().session(), pid(1), 1);

        // Never loaded: the line ID is discovered by a refetch.
        let snapshot = store.set_quantity(pid(1), 2).await.unwrap();
        assert_eq!(snapshot.quantity_of(pid(1)), 2);
    }

    #[tokio::test]
    async fn test_set_quantity_not_in_cart() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);

        let err = store.set_quantity(pid(1), 2).await.unwrap_err();
        assert!(matches!(err, CartError::NotInCart(id) if id == pid(1)));
    }

    #[tokio::test]
    async fn test_set_quantity_above_ceiling_is_refused() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 2));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();

        let err = store.set_quantity(pid(1), 3).await.unwrap_err();
        assert!(matches!(err, CartError::Unavailable { .. }));
        assert_eq!(store.total_units(), 1);
    }

    #[tokio::test]
    async fn test_set_quantity_zero_equals_remove() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 500, 5))
            .with_product(FakeProduct::new(2, 300, 5));
        let a = store_for(&fake, "a", MutationPolicy::Queue);
        let b = store_for(&fake, "b", MutationPolicy::Queue);

        for store in [&a, &b] {
            store.add_by_id(pid(1)).await.unwrap();
            store.add_by_id(pid(2)).await.unwrap();
        }

        let via_set = a.set_quantity(pid(1), 0).await.unwrap();
        let via_remove = b.remove(pid(1)).await.unwrap();

        assert!(via_set.line_for(pid(1)).is_none());
        assert!(via_remove.line_for(pid(1)).is_none());
        assert_eq!(via_set.total_units(), via_remove.total_units());
    }

    #[tokio::test]
    async fn test_negative_quantity_removes() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();

        let snapshot = store.set_quantity(pid(1), -4).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_huge_quantity_is_invalid() {
        let fake = FakeStore::new();
        let store = store(&fake);
        let err = store.set_quantity(pid(1), i64::MAX).await.unwrap_err();
        assert!(matches!(err, CartError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 5));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();
        let before = store.current_snapshot();

        store.remove(pid(2)).await.unwrap();
        assert_eq!(*store.current_snapshot(), *before);
    }

    #[tokio::test]
    async fn test_clear() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 500, 5))
            .with_product(FakeProduct::new(2, 300, 5));
        let store = store(&fake);
        store.add_by_id(pid(1)).await.unwrap();
        store.add_by_id(pid(2)).await.unwrap();

        let snapshot = store.clear().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(fake.server_units(store.context().session()).await, 0);
    }

    // =========================================================================
    // Convergence and concurrency
    // =========================================================================

    #[tokio::test]
    async fn test_converges_with_server() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 100, 10))
            .with_product(FakeProduct::new(2, 200, 10))
            .with_product(FakeProduct::new(3, 300, 10));
        let store = store(&fake);

        store.add_by_id(pid(1)).await.unwrap();
        store.add_by_id(pid(2)).await.unwrap();
        store.add_by_id(pid(1)).await.unwrap();
        store.set_quantity(pid(2), 4).await.unwrap();
        store.add_by_id(pid(3)).await.unwrap();
        store.remove(pid(1)).await.unwrap();
        store.set_quantity(pid(3), 2).await.unwrap();
        store.load().await.unwrap();

        assert_eq!(
            store.total_units(),
            fake.server_units(store.context().session()).await
        );
        assert_eq!(store.total_units(), 6);
    }

    #[tokio::test]
    async fn test_mutations_are_never_sent_in_parallel() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 100, 50))
            .with_latency(Duration::from_millis(5));
        let store = store(&fake);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add_by_id(pid(1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(fake.max_concurrent_mutations(), 1);
        assert_eq!(store.total_units(), 10);
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_second_mutation() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 100, 50))
            .with_latency(Duration::from_millis(50));
        let store = store_for(&fake, "a", MutationPolicy::Reject);

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.add_by_id(pid(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = store.add_by_id(pid(1)).await;

        assert!(matches!(second, Err(CartError::Busy)));
        first.await.unwrap().unwrap();
        assert_eq!(store.total_units(), 1);
    }

    #[tokio::test]
    async fn test_phase_returns_to_idle() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 100, 5))
            .with_latency(Duration::from_millis(20));
        let store = store(&fake);
        let mut phases = store.subscribe();

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.add_by_id(pid(1)).await })
        };
        phases.changed().await.unwrap();
        assert_eq!(*phases.borrow_and_update(), CartPhase::Mutating);

        task.await.unwrap().unwrap();
        assert_eq!(store.phase(), CartPhase::Idle);
    }

    #[tokio::test]
    async fn test_last_unit_race_between_sessions() {
        let fake = FakeStore::new()
            .with_product(FakeProduct::new(1, 500, 1))
            .with_latency(Duration::from_millis(5));
        let a = store_for(&fake, "a", MutationPolicy::Queue);
        let b = store_for(&fake, "b", MutationPolicy::Queue);
        a.load().await.unwrap();
        b.load().await.unwrap();

        let (ra, rb) = tokio::join!(a.add_by_id(pid(1)), b.add_by_id(pid(1)));

        let outcomes = [ra.is_ok(), rb.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let rejected = if ra.is_err() { ra } else { rb };
        assert!(matches!(rejected, Err(CartError::Unavailable { .. })));

        a.load().await.unwrap();
        b.load().await.unwrap();
        assert_eq!(a.total_units() + b.total_units(), 1);
        for store in [&a, &b] {
            let reported = store.availability().reported(pid(1)).unwrap();
            assert_eq!(reported.available_quantity, Some(0));
        }
    }

    #[tokio::test]
    async fn test_add_never_exceeds_reported_availability() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 3));
        let store = store(&fake);
        store.load().await.unwrap();

        for _ in 0..6 {
            let _ = store.add_by_id(pid(1)).await;
            let snapshot = store.current_snapshot();
            assert!(snapshot.quantity_of(pid(1)) <= 3);
        }
        assert_eq!(store.total_units(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_drops_credential() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 500, 3));
        let ctx = SessionContext::with_credential(
            SessionToken::parse("session_1_auth").unwrap(),
            Some(secrecy::SecretString::from("expired")),
        );
        let store = CartStore::new(
            Arc::new(fake.clone()),
            ctx.clone(),
            AvailabilityModel::new(ctx.clone()),
            MutationPolicy::Queue,
        );

        fake.fail_next(Op::AddToCart, Fault::Unauthorized);
        let err = store.add_by_id(pid(1)).await.unwrap_err();
        assert!(matches!(err, CartError::Unauthorized));
        assert!(!ctx.has_credential());
    }
}
