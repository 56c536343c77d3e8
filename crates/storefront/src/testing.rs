//! In-memory fake of the remote Cart/Product API.
//!
//! Requests are applied one at a time against shared state, the same way the
//! real server serializes its read-modify-write reservation accounting.
//! Availability is computed across every session. Faults can be queued per
//! operation to exercise failure paths.
//!
//! Available under `cfg(test)` and the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use resale_core::{
    AnnouncementId, CartLineId, OrderId, OrderStatus, Price, ProductId, SessionToken,
};

use crate::api::{
    Announcement, AnnouncementRequest, ApiError, CartLineRecord, OrderRequest, PlacedOrder,
    Product, StoreApi,
};
use crate::context::SessionContext;

/// Remote operations, for targeted fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FetchCart,
    AddToCart,
    UpdateCartLine,
    RemoveCartLine,
    ClearCart,
    FetchProducts,
    FetchProduct,
    PlaceOrder,
    FetchAnnouncements,
    CreateAnnouncement,
    DeleteAnnouncement,
}

impl Op {
    const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::AddToCart | Self::UpdateCartLine | Self::RemoveCartLine | Self::ClearCart
        )
    }
}

/// A failure to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No response reached the client.
    Transport,
    /// The response did not decode.
    Malformed,
    /// 401.
    Unauthorized,
    /// Explicit rejection.
    Rejected {
        /// HTTP status.
        status: u16,
        /// Reason.
        message: String,
    },
}

impl Fault {
    fn into_error(self) -> ApiError {
        match self {
            Self::Transport => ApiError::Transport("connection reset by fake".to_string()),
            Self::Malformed => ApiError::Malformed("expected an array".to_string()),
            Self::Unauthorized => ApiError::Unauthorized,
            Self::Rejected { status, message } => ApiError::Rejected { status, message },
        }
    }
}

/// Seed data for one catalog product.
#[derive(Debug, Clone)]
pub struct FakeProduct {
    id: ProductId,
    name: String,
    brand: Option<String>,
    price: Price,
    stock: u32,
    published_at: Option<String>,
}

impl FakeProduct {
    /// Product `id` priced `price` with `stock` units.
    #[must_use]
    pub fn new(id: i64, price: i64, stock: u32) -> Self {
        Self {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            brand: None,
            price: Price::from_units(price),
            stock,
            published_at: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the brand.
    #[must_use]
    pub fn brand(mut self, brand: &str) -> Self {
        self.brand = Some(brand.to_string());
        self
    }

    /// Set the raw `publishedAt` value.
    #[must_use]
    pub fn published_at(mut self, raw: &str) -> Self {
        self.published_at = Some(raw.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct Line {
    id: CartLineId,
    session: String,
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Default)]
struct State {
    products: Vec<FakeProduct>,
    lines: Vec<Line>,
    next_line: i64,
    orders: HashMap<Uuid, PlacedOrder>,
    placed: Vec<OrderRequest>,
    announcements: Vec<Announcement>,
    next_announcement: i64,
}

impl State {
    fn product(&self, id: ProductId) -> Option<&FakeProduct> {
        self.products.iter().find(|p| p.id == id)
    }

    fn reserved(&self, id: ProductId) -> u32 {
        self.lines
            .iter()
            .filter(|l| l.product_id == id)
            .map(|l| l.quantity)
            .sum()
    }

    fn available(&self, id: ProductId) -> u32 {
        self.product(id)
            .map_or(0, |p| p.stock.saturating_sub(self.reserved(id)))
    }

    fn to_product(&self, seed: &FakeProduct) -> Product {
        Product {
            id: seed.id,
            name: seed.name.clone(),
            brand: seed.brand.clone(),
            description: None,
            price: seed.price,
            size: None,
            color: None,
            images: vec![format!("/uploads/{}.jpg", seed.id)],
            stock_quantity: seed.stock,
            available_quantity: Some(self.available(seed.id)),
            published_at: seed.published_at.clone(),
        }
    }

    fn to_record(&self, line: &Line) -> CartLineRecord {
        CartLineRecord {
            id: line.id,
            product_id: line.product_id,
            quantity: i64::from(line.quantity),
            product: self.product(line.product_id).map(|p| self.to_product(p)),
        }
    }

    fn insufficient(&self, id: ProductId) -> ApiError {
        ApiError::Rejected {
            status: 409,
            message: format!("Only {} available", self.available(id)),
        }
    }
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    in_flight: std::sync::Mutex<HashMap<String, usize>>,
    max_concurrent_mutations: AtomicUsize,
}

/// In-memory [`StoreApi`].
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
    faults: Arc<std::sync::Mutex<HashMap<Op, VecDeque<Fault>>>>,
    counters: Arc<Counters>,
    latency: Option<Duration>,
    operator_token: Option<String>,
}

impl FakeStore {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog product.
    #[must_use]
    pub fn with_product(self, product: FakeProduct) -> Self {
        if let Ok(mut state) = self.state.try_lock() {
            state.products.push(product);
        }
        self
    }

    /// Delay every request.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Require `Bearer <token>` for announcement endpoints.
    #[must_use]
    pub fn with_operator_token(mut self, token: &str) -> Self {
        self.operator_token = Some(token.to_string());
        self
    }

    /// Fail the next call of `op` with `fault`.
    pub fn fail_next(&self, op: Op, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    /// Put a line straight into server state, bypassing availability checks.
    pub fn seed_line(&self, session: &SessionToken, product_id: ProductId, quantity: u32) {
        if let Ok(mut state) = self.state.try_lock() {
            state.next_line += 1;
            let id = CartLineId::new(state.next_line);
            state.lines.push(Line {
                id,
                session: session.as_str().to_string(),
                product_id,
                quantity,
            });
        }
    }

    /// Total requests received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Most cart mutations ever in flight at once for a single session.
    #[must_use]
    pub fn max_concurrent_mutations(&self) -> usize {
        self.counters.max_concurrent_mutations.load(Ordering::SeqCst)
    }

    /// Units the server holds for `session`.
    pub async fn server_units(&self, session: &SessionToken) -> u64 {
        self.state
            .lock()
            .await
            .lines
            .iter()
            .filter(|l| l.session == session.as_str())
            .map(|l| u64::from(l.quantity))
            .sum()
    }

    /// Orders received so far.
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.placed.clone()
    }

    /// Current stock of `product_id`.
    pub async fn stock(&self, product_id: ProductId) -> Option<u32> {
        self.state.lock().await.product(product_id).map(|p| p.stock)
    }

    /// Run `f` against the state as one serialized request.
    async fn request<T>(
        &self,
        op: Op,
        ctx: &SessionContext,
        f: impl FnOnce(&mut State) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let session = ctx.session().as_str().to_string();

        if op.is_mutation() {
            let mut in_flight = self
                .counters
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = in_flight.entry(session.clone()).or_default();
            *count += 1;
            self.counters
                .max_concurrent_mutations
                .fetch_max(*count, Ordering::SeqCst);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&op)
            .and_then(VecDeque::pop_front);

        let result = match fault {
            Some(fault) => Err(fault.into_error()),
            None => {
                let mut state = self.state.lock().await;
                f(&mut state)
            }
        };

        if op.is_mutation() {
            let mut in_flight = self
                .counters
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(count) = in_flight.get_mut(&session) {
                *count = count.saturating_sub(1);
            }
        }

        result
    }

    fn authorize(&self, ctx: &SessionContext) -> Result<(), ApiError> {
        let expected = self
            .operator_token
            .as_ref()
            .map(|token| format!("Bearer {token}"));
        match expected {
            Some(expected) if ctx.bearer().as_deref() != Some(expected.as_str()) => {
                Err(ApiError::Unauthorized)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StoreApi for FakeStore {
    async fn fetch_cart(&self, ctx: &SessionContext) -> Result<Vec<CartLineRecord>, ApiError> {
        let session = ctx.session().as_str().to_string();
        self.request(Op::FetchCart, ctx, |state| {
            Ok(state
                .lines
                .iter()
                .filter(|l| l.session == session)
                .map(|l| state.to_record(l))
                .collect())
        })
        .await
    }

    async fn add_to_cart(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError> {
        let session = ctx.session().as_str().to_string();
        self.request(Op::AddToCart, ctx, |state| {
            if state.product(product_id).is_none() {
                return Err(ApiError::NotFound(format!("Product {product_id} not found")));
            }
            if quantity == 0 || state.available(product_id) < quantity {
                return Err(state.insufficient(product_id));
            }
            let existing = state
                .lines
                .iter()
                .position(|l| l.session == session && l.product_id == product_id);
            let index = if let Some(index) = existing {
                index
            } else {
                state.next_line += 1;
                let id = CartLineId::new(state.next_line);
                state.lines.push(Line {
                    id,
                    session,
                    product_id,
                    quantity: 0,
                });
                state.lines.len() - 1
            };
            let mut line = state
                .lines
                .get(index)
                .cloned()
                .ok_or_else(|| ApiError::Transport("line vanished".to_string()))?;
            line.quantity += quantity;
            if let Some(slot) = state.lines.get_mut(index) {
                slot.quantity = line.quantity;
            }
            Ok(state.to_record(&line))
        })
        .await
    }

    async fn update_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLineRecord, ApiError> {
        self.request(Op::UpdateCartLine, ctx, |state| {
            let line = state
                .lines
                .iter()
                .find(|l| l.id == line_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("Cart line {line_id} not found")))?;
            if quantity == 0 {
                return Err(ApiError::Rejected {
                    status: 400,
                    message: "Quantity must be positive".to_string(),
                });
            }
            let extra = quantity.saturating_sub(line.quantity);
            if extra > state.available(line.product_id) {
                return Err(state.insufficient(line.product_id));
            }
            let updated = Line { quantity, ..line };
            if let Some(slot) = state.lines.iter_mut().find(|l| l.id == line_id) {
                slot.quantity = quantity;
            }
            Ok(state.to_record(&updated))
        })
        .await
    }

    async fn remove_cart_line(
        &self,
        ctx: &SessionContext,
        line_id: CartLineId,
    ) -> Result<(), ApiError> {
        self.request(Op::RemoveCartLine, ctx, |state| {
            let before = state.lines.len();
            state.lines.retain(|l| l.id != line_id);
            if state.lines.len() == before {
                return Err(ApiError::NotFound(format!("Cart line {line_id} not found")));
            }
            Ok(())
        })
        .await
    }

    async fn clear_cart(&self, ctx: &SessionContext) -> Result<(), ApiError> {
        let session = ctx.session().as_str().to_string();
        self.request(Op::ClearCart, ctx, |state| {
            state.lines.retain(|l| l.session != session);
            Ok(())
        })
        .await
    }

    async fn fetch_products(&self, ctx: &SessionContext) -> Result<Vec<Product>, ApiError> {
        self.request(Op::FetchProducts, ctx, |state| {
            Ok(state.products.iter().map(|p| state.to_product(p)).collect())
        })
        .await
    }

    async fn fetch_product(
        &self,
        ctx: &SessionContext,
        product_id: ProductId,
    ) -> Result<Product, ApiError> {
        self.request(Op::FetchProduct, ctx, |state| {
            state
                .product(product_id)
                .map(|p| state.to_product(p))
                .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found")))
        })
        .await
    }

    async fn place_order(
        &self,
        ctx: &SessionContext,
        request: &OrderRequest,
        idempotency_key: Uuid,
    ) -> Result<PlacedOrder, ApiError> {
        let request = request.clone();
        self.request(Op::PlaceOrder, ctx, |state| {
            if let Some(order) = state.orders.get(&idempotency_key) {
                return Ok(order.clone());
            }
            if request.items.is_empty() {
                return Err(ApiError::Rejected {
                    status: 400,
                    message: "Order has no items".to_string(),
                });
            }
            for item in &request.items {
                let seed = state
                    .products
                    .iter_mut()
                    .find(|p| p.id == item.product_id)
                    .ok_or_else(|| ApiError::NotFound(format!("Product {}", item.product_id)))?;
                seed.stock = seed.stock.saturating_sub(item.quantity);
            }
            let id = OrderId::new(i64::try_from(state.orders.len()).unwrap_or(i64::MAX) + 1);
            let order = PlacedOrder {
                id,
                status: OrderStatus::Assembling,
                total: Some(request.total),
            };
            state.orders.insert(idempotency_key, order.clone());
            state.placed.push(request);
            Ok(order)
        })
        .await
    }

    async fn fetch_announcements(
        &self,
        ctx: &SessionContext,
    ) -> Result<Vec<Announcement>, ApiError> {
        self.authorize(ctx)?;
        self.request(Op::FetchAnnouncements, ctx, |state| {
            Ok(state.announcements.clone())
        })
        .await
    }

    async fn create_announcement(
        &self,
        ctx: &SessionContext,
        request: &AnnouncementRequest,
    ) -> Result<Announcement, ApiError> {
        self.authorize(ctx)?;
        let request = request.clone();
        self.request(Op::CreateAnnouncement, ctx, |state| {
            state.next_announcement += 1;
            let announcement = Announcement {
                id: AnnouncementId::new(state.next_announcement),
                message: request.message,
                scheduled_at: utc_wire(request.scheduled_at),
                product_ids: request.product_ids,
                is_sent: false,
            };
            state.announcements.push(announcement.clone());
            Ok(announcement)
        })
        .await
    }

    async fn delete_announcement(
        &self,
        ctx: &SessionContext,
        id: AnnouncementId,
    ) -> Result<(), ApiError> {
        self.authorize(ctx)?;
        self.request(Op::DeleteAnnouncement, ctx, |state| {
            let before = state.announcements.len();
            state.announcements.retain(|a| a.id != id);
            if state.announcements.len() == before {
                return Err(ApiError::NotFound(format!("Announcement {id} not found")));
            }
            Ok(())
        })
        .await
    }
}

fn utc_wire(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn ctx(name: &str) -> SessionContext {
        SessionContext::new(SessionToken::parse(name).unwrap())
    }

    #[tokio::test]
    async fn test_availability_counts_every_session() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 100, 3));
        let a = ctx("a");
        let b = ctx("b");

        fake.add_to_cart(&a, ProductId::new(1), 2).await.unwrap();
        let products = fake.fetch_products(&b).await.unwrap();
        assert_eq!(products.first().unwrap().available_quantity, Some(1));

        let err = fake.add_to_cart(&b, ProductId::new(1), 2).await.unwrap_err();
        assert!(err.is_insufficient_stock());
    }

    #[tokio::test]
    async fn test_faults_are_per_operation() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 100, 3));
        let a = ctx("a");
        fake.fail_next(Op::FetchCart, Fault::Transport);

        assert!(fake.fetch_products(&a).await.is_ok());
        assert!(fake.fetch_cart(&a).await.unwrap_err().is_transport());
        assert!(fake.fetch_cart(&a).await.is_ok());
    }

    #[tokio::test]
    async fn test_idempotent_orders() {
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 100, 3));
        let a = ctx("a");
        let request = OrderRequest {
            session_id: "a".to_string(),
            customer: crate::api::OrderCustomer {
                name: "Анна".to_string(),
                phone: "+7 900 000-00-00".to_string(),
                email: None,
                address: None,
            },
            delivery_method: resale_core::DeliveryMethod::Avito,
            comment: None,
            items: vec![crate::api::OrderItem {
                product_id: ProductId::new(1),
                quantity: 1,
                unit_price: Price::from_units(100),
            }],
            total: Price::from_units(100),
        };
        let key = Uuid::new_v4();

        let first = fake.place_order(&a, &request, key).await.unwrap();
        let second = fake.place_order(&a, &request, key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fake.placed_orders().await.len(), 1);
        assert_eq!(fake.stock(ProductId::new(1)).await, Some(2));
    }

    #[tokio::test]
    async fn test_operator_endpoints_check_the_bearer_token() {
        let fake = FakeStore::new().with_operator_token("op-secret");
        let operator = SessionContext::with_credential(
            SessionToken::parse("a").unwrap(),
            Some(SecretString::from("op-secret".to_string())),
        );
        let stale = SessionContext::with_credential(
            SessionToken::parse("b").unwrap(),
            Some(SecretString::from("stale".to_string())),
        );

        assert!(fake.fetch_announcements(&operator).await.is_ok());
        assert!(matches!(
            fake.fetch_announcements(&stale).await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            fake.fetch_announcements(&ctx("c")).await,
            Err(ApiError::Unauthorized)
        ));
    }
}
