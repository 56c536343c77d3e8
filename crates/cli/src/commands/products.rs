//! Product listing.
//!
//! # Usage
//!
//! ```bash
//! # Products visible now, with what this session can still add
//! resale products list
//!
//! # Include scheduled products, filtered by brand
//! resale products list --all --brand zara
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use resale_core::CivilDateTime;

use resale_storefront::Storefront;
use resale_storefront::api::Product;
use resale_storefront::cart::CartSnapshot;
use resale_storefront::catalog::filter_by_brand;

use super::CliError;

/// List products with this session's remaining quantity.
///
/// # Errors
///
/// Returns an error if the listing cannot be fetched.
pub async fn list(
    shop: &Storefront,
    all: bool,
    brand: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    let snapshot = shop.cart().load().await?;
    let products = if all {
        shop.catalog().all_products().await?.as_ref().clone()
    } else {
        shop.catalog().visible_products(now).await?
    };
    let products = filter_by_brand(&products, brand.unwrap_or_default());

    if products.is_empty() {
        return Ok("No products found.".to_string());
    }

    let mut out = String::new();
    for product in products {
        let _ = writeln!(out, "{}", describe(shop, product, &snapshot, now));
    }
    Ok(out.trim_end().to_string())
}

fn describe(
    shop: &Storefront,
    product: &Product,
    snapshot: &CartSnapshot,
    now: DateTime<Utc>,
) -> String {
    let mut line = format!("#{} {}", product.id, product.name);
    if let Some(brand) = &product.brand {
        let _ = write!(line, " ({brand})");
    }
    let _ = write!(line, " - {}", product.price);

    let availability = shop.cart().availability();
    let held = snapshot.quantity_of(product.id);
    let remaining = availability.remaining(product, snapshot);
    match (remaining, held) {
        (0, 0) => line.push_str(" - sold out"),
        (0, _) => line.push_str(" - all remaining units are in your cart"),
        (n, _) => {
            let _ = write!(line, " - {n} available");
        }
    }
    if held > 0 {
        let _ = write!(line, ", {held} in your cart");
    }

    let clock = shop.catalog().clock();
    if let Some(from) = clock.visible_from(product)
        && from > now
    {
        let opens_in = from - now;
        let _ = write!(
            line,
            " [from {}, opens in {}h {}m]",
            CivilDateTime::from_utc(from, clock.zone()).format_display(),
            opens_in.num_hours(),
            opens_in.num_minutes() % 60
        );
    }
    line
}
