//! Order placement from a reconciled cart.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use resale_core::{DeliveryMethod, Phone, Price};

use crate::api::{OrderCustomer, OrderItem, OrderRequest, PlacedOrder, StoreApi};
use crate::cart::{CartSnapshot, CartStore};
use crate::error::CheckoutError;

/// Customer input for an order.
#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub comment: Option<String>,
}

impl OrderDraft {
    /// Check required fields and normalise optional ones.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::MissingField` for a blank name or phone and
    /// `CheckoutError::InvalidPhone` for an unusable phone number.
    pub fn customer(&self) -> Result<OrderCustomer, CheckoutError> {
        let name = self.customer_name.trim();
        if name.is_empty() {
            return Err(CheckoutError::MissingField("name"));
        }
        if self.phone.trim().is_empty() {
            return Err(CheckoutError::MissingField("phone"));
        }
        let phone = Phone::parse(&self.phone)?;

        Ok(OrderCustomer {
            name: name.to_string(),
            phone: phone.as_str().to_string(),
            email: non_blank(self.email.as_deref()),
            address: non_blank(self.address.as_deref()),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    /// The server's acknowledgement.
    pub order: PlacedOrder,
    /// Total of the ordered snapshot.
    pub total: Price,
    /// Units ordered.
    pub units: u64,
    /// Whether the cart was emptied afterwards.
    pub cart_cleared: bool,
}

/// Places orders for the session's cart.
#[derive(Clone)]
pub struct CheckoutFlow {
    inner: Arc<CheckoutInner>,
}

struct CheckoutInner {
    api: Arc<dyn StoreApi>,
    cart: CartStore,
    in_progress: Mutex<()>,
}

impl CheckoutFlow {
    /// Checkout over `cart`.
    #[must_use]
    pub fn new(api: Arc<dyn StoreApi>, cart: CartStore) -> Self {
        Self {
            inner: Arc::new(CheckoutInner {
                api,
                cart,
                in_progress: Mutex::new(()),
            }),
        }
    }

    /// Place an order with a fresh idempotency key.
    ///
    /// # Errors
    ///
    /// See [`Self::place_order_with_key`].
    pub async fn place_order(
        &self,
        draft: &OrderDraft,
    ) -> Result<OrderConfirmation, CheckoutError> {
        self.place_order_with_key(draft, Uuid::new_v4()).await
    }

    /// Place an order. Reusing `idempotency_key` after a transport failure
    /// cannot create a second order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InProgress` while another submission runs,
    /// a validation error, `CheckoutError::EmptyCart`, or the API failure.
    #[instrument(skip(self, draft), fields(key = %idempotency_key))]
    pub async fn place_order_with_key(
        &self,
        draft: &OrderDraft,
        idempotency_key: Uuid,
    ) -> Result<OrderConfirmation, CheckoutError> {
        let _submitting = self
            .inner
            .in_progress
            .try_lock()
            .map_err(|_| CheckoutError::InProgress)?;

        let customer = draft.customer()?;
        let snapshot = self.inner.cart.load().await?;
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let request = build_request(&self.inner.cart, &snapshot, customer, draft);
        let order = self
            .inner
            .api
            .place_order(self.inner.cart.context(), &request, idempotency_key)
            .await?;
        info!(order_id = %order.id, total = %request.total, "Order placed");

        let cart_cleared = match self.inner.cart.clear().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Order placed but the cart could not be cleared");
                false
            }
        };

        Ok(OrderConfirmation {
            order,
            total: request.total,
            units: snapshot.total_units(),
            cart_cleared,
        })
    }
}

fn build_request(
    cart: &CartStore,
    snapshot: &CartSnapshot,
    customer: OrderCustomer,
    draft: &OrderDraft,
) -> OrderRequest {
    OrderRequest {
        session_id: cart.context().session().as_str().to_string(),
        customer,
        delivery_method: draft.delivery_method,
        comment: non_blank(draft.comment.as_deref()),
        items: snapshot
            .lines()
            .iter()
            .map(|line| OrderItem {
                product_id: line.product_id,
                quantity: line.quantity.get(),
                unit_price: line.unit_price,
            })
            .collect(),
        total: snapshot.total_price(),
    }
}
