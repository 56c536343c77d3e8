//! Order placement.
//!
//! # Usage
//!
//! ```bash
//! resale checkout --name "Анна" --phone "+7 900 123-45-67" --delivery 5post
//! ```

use resale_storefront::Storefront;
use resale_storefront::checkout::OrderDraft;

use super::CliError;

/// Place an order for the current cart.
///
/// # Errors
///
/// Returns a validation error, `EmptyCart`, or the API failure.
pub async fn place(shop: &Storefront, draft: &OrderDraft) -> Result<String, CliError> {
    let confirmation = shop.checkout().place_order(draft).await?;

    let mut out = format!(
        "Order #{} placed: {} item(s), {} ({})",
        confirmation.order.id,
        confirmation.units,
        confirmation.total,
        confirmation.order.status.label()
    );
    if !confirmation.cart_cleared {
        out.push_str("\nThe cart could not be emptied; run `resale cart clear`.");
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use resale_core::{DeliveryMethod, ProductId};
    use resale_storefront::error::CheckoutError;
    use resale_storefront::testing::{FakeProduct, FakeStore};

    use super::*;
    use crate::commands::test_support::storefront;

    fn draft() -> OrderDraft {
        OrderDraft {
            customer_name: "Анна".to_string(),
            phone: "+7 900 123-45-67".to_string(),
            delivery_method: DeliveryMethod::Ozon,
            ..OrderDraft::default()
        }
    }

    #[tokio::test]
    async fn test_place_order() {
        let dir = TempDir::new().unwrap();
        let fake = FakeStore::new().with_product(FakeProduct::new(1, 1500, 1));
        let shop = storefront(&fake, &dir);
        shop.cart().add_by_id(ProductId::new(1)).await.unwrap();

        let out = place(&shop, &draft()).await.unwrap();

        assert!(out.starts_with("Order #1 placed: 1 item(s), 1500 ₽"));
        assert!(shop.cart().current_snapshot().is_empty());
        assert_eq!(fake.stock(ProductId::new(1)).await, Some(0));
    }

    #[tokio::test]
    async fn test_empty_cart() {
        let dir = TempDir::new().unwrap();
        let shop = storefront(&FakeStore::new(), &dir);

        let err = place(&shop, &draft()).await.unwrap_err();
        assert!(matches!(err, CliError::Checkout(CheckoutError::EmptyCart)));
        assert_eq!(err.user_message(), "Your cart is empty.");
    }
}
