//! Subcommand implementations.
//!
//! Every command returns the text to print, so `main` owns all output.

pub mod announcements;
pub mod cart;
pub mod checkout;
pub mod products;
pub mod session;

use thiserror::Error;

use resale_storefront::api::ApiError;
use resale_storefront::config::ConfigError;
use resale_storefront::error::{
    AnnouncementError, CartError, CheckoutError, api_user_message,
};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bare API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// A cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Placing the order failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Managing announcements failed.
    #[error("Announcement error: {0}")]
    Announcement(#[from] AnnouncementError),

    /// The persisted session could not be removed.
    #[error("Session error: {0}")]
    Session(#[from] std::io::Error),
}

impl CliError {
    /// Message shown to the person at the terminal.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.to_string(),
            Self::Api(err) => api_user_message(err),
            Self::Cart(err) => err.user_message(),
            Self::Checkout(err) => err.user_message(),
            Self::Announcement(err) => err.user_message(),
            Self::Session(err) => format!("Could not reset the session: {err}"),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use resale_storefront::Storefront;
    use resale_storefront::config::StorefrontConfig;
    use resale_storefront::session::SessionIdentity;
    use resale_storefront::testing::FakeStore;

    #[allow(clippy::unwrap_used)]
    pub fn storefront(fake: &FakeStore, dir: &TempDir) -> Storefront {
        let config =
            StorefrontConfig::for_origin("http://localhost:55501", dir.path().join("session"))
                .unwrap();
        let identity = SessionIdentity::file(&config.session_file);
        Storefront::with_api(config, Arc::new(fake.clone()), identity)
    }
}
