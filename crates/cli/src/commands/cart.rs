//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! resale cart show
//! resale cart add 12
//! resale cart set 12 3
//! resale cart remove 12
//! resale cart clear
//! ```
//!
//! Every command prints the reconciled cart afterwards, exactly as the server
//! reports it.

use std::fmt::Write as _;

use resale_core::ProductId;
use resale_storefront::Storefront;
use resale_storefront::cart::CartSnapshot;

use super::CliError;

/// A cart operation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartCommand {
    Show,
    Add(ProductId),
    Set(ProductId, i64),
    Remove(ProductId),
    Clear,
}

/// Run `command` and render the resulting cart.
///
/// # Errors
///
/// Returns the cart error; the cart itself is still reconciled.
pub async fn run(shop: &Storefront, command: CartCommand) -> Result<String, CliError> {
    let cart = shop.cart();
    let snapshot = match command {
        CartCommand::Show => cart.load().await?,
        CartCommand::Add(id) => {
            // Availability must be fresh before the ceiling check.
            cart.load().await?;
            cart.add_by_id(id).await?
        }
        CartCommand::Set(id, quantity) => {
            cart.load().await?;
            cart.set_quantity(id, quantity).await?
        }
        CartCommand::Remove(id) => {
            cart.load().await?;
            cart.remove(id).await?
        }
        CartCommand::Clear => cart.clear().await?,
    };
    Ok(render(&snapshot))
}

/// Render a snapshot.
#[must_use]
pub fn render(snapshot: &CartSnapshot) -> String {
    if snapshot.is_empty() {
        return "Your cart is empty.".to_string();
    }

    let mut out = String::new();
    for line in snapshot.lines() {
        let _ = write!(out, "#{} {}", line.product_id, line.name);
        let details: Vec<&str> = [line.size.as_deref(), line.color.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !details.is_empty() {
            let _ = write!(out, " ({})", details.join(", "));
        }
        let _ = writeln!(
            out,
            " x{} @ {} = {}",
            line.quantity,
            line.unit_price,
            line.line_total()
        );
    }
    let _ = write!(
        out,
        "Total: {} item(s), {}",
        snapshot.total_units(),
        snapshot.total_price()
    );
    out
}
