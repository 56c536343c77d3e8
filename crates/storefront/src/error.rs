//! Errors surfaced to UI collaborators.
//!
//! Each variant carries enough to render a message via `user_message()`.
//! Transport failures and malformed responses read the same to the user:
//! nothing trustworthy came back, so try again.

use thiserror::Error;

use resale_core::{PhoneError, ProductId};

use crate::api::ApiError;

const TRY_AGAIN: &str = "Could not reach the shop. Please try again.";

/// Failure of a cart operation.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product has no stable identity; nothing was sent.
    #[error("Product has no ID")]
    MissingProductId,

    /// The server (or the local ceiling check) refused for lack of stock.
    #[error("Product {product_id} unavailable: {message}")]
    Unavailable {
        /// Product that could not be reserved.
        product_id: ProductId,
        /// Human-readable reason.
        message: String,
    },

    /// `set_quantity` on a product the cart does not hold.
    #[error("Product {0} is not in the cart")]
    NotInCart(ProductId),

    /// Another mutation is in flight and the store rejects rather than queues.
    #[error("Another cart update is in progress")]
    Busy,

    /// The requested quantity cannot be represented.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The server declined the request.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The credential was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// No usable response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The mutation was accepted but the follow-up refetch failed.
    #[error("Cart updated but could not be refreshed: {0}")]
    RefreshFailed(String),
}

impl CartError {
    /// Map an API failure for a request about `product_id`.
    #[must_use]
    pub fn from_api(err: ApiError, product_id: Option<ProductId>) -> Self {
        if let (Some(product_id), true) = (product_id, err.is_insufficient_stock()) {
            let message = match err {
                ApiError::Rejected { message, .. } if !message.is_empty() => message,
                _ => "Not enough stock available".to_string(),
            };
            return Self::Unavailable {
                product_id,
                message,
            };
        }
        match err {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Rejected { status, message } if status >= 500 => Self::Transport(message),
            ApiError::Rejected { message, .. } | ApiError::NotFound(message) => {
                Self::Rejected(message)
            }
            ApiError::Transport(message) | ApiError::Malformed(message) => {
                Self::Transport(message)
            }
            ApiError::RateLimited(secs) => Self::Transport(format!("rate limited for {secs}s")),
        }
    }

    /// Whether the failure is "no answer" rather than a decision.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RefreshFailed(_))
    }

    /// Message suitable for display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingProductId => "This product cannot be added to the cart.".to_string(),
            Self::Unavailable { message, .. } => message.clone(),
            Self::NotInCart(_) => "This product is no longer in your cart.".to_string(),
            Self::Busy => "Your cart is being updated, please wait.".to_string(),
            Self::InvalidQuantity(_) => "Please enter a valid quantity.".to_string(),
            Self::Rejected(message) => message.clone(),
            Self::Unauthorized => "Your login has expired. Please sign in again.".to_string(),
            Self::Transport(_) => TRY_AGAIN.to_string(),
            Self::RefreshFailed(_) => {
                "Your cart was updated but could not be refreshed. Please reload.".to_string()
            }
        }
    }
}

impl From<ApiError> for CartError {
    fn from(err: ApiError) -> Self {
        Self::from_api(err, None)
    }
}

/// Failure to place an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A required field is blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The phone number is not usable.
    #[error("Invalid phone: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// Nothing to order.
    #[error("Cart is empty")]
    EmptyCart,

    /// An order submission is already running.
    #[error("Order already being placed")]
    InProgress,

    /// Reconciling the cart before or after ordering failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The order request failed.
    #[error("Order failed: {0}")]
    Api(#[from] ApiError),
}

impl CheckoutError {
    /// Message suitable for display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingField(field) => format!("Please fill in {field}."),
            Self::InvalidPhone(_) => "Please enter a valid phone number.".to_string(),
            Self::EmptyCart => "Your cart is empty.".to_string(),
            Self::InProgress => "Your order is being placed, please wait.".to_string(),
            Self::Cart(err) => err.user_message(),
            Self::Api(err) => api_user_message(err),
        }
    }
}

/// Failure managing scheduled announcements.
#[derive(Debug, Error)]
pub enum AnnouncementError {
    /// Message text is blank.
    #[error("Announcement message is empty")]
    EmptyMessage,

    /// No product was selected.
    #[error("Announcement has no products")]
    NoProducts,

    /// No send time was given.
    #[error("Announcement has no scheduled time")]
    MissingSchedule,

    /// A time could not be read.
    #[error("Invalid time: {0}")]
    InvalidTime(#[from] resale_core::CivilTimeError),

    /// The API call failed.
    #[error("Announcement request failed: {0}")]
    Api(#[from] ApiError),
}

impl AnnouncementError {
    /// Message suitable for display.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyMessage => "Please enter the announcement text.".to_string(),
            Self::NoProducts => "Please select at least one product.".to_string(),
            Self::MissingSchedule => "Please choose when to send the announcement.".to_string(),
            Self::InvalidTime(_) => "Please enter the time as YYYY-MM-DDTHH:MM.".to_string(),
            Self::Api(err) => api_user_message(err),
        }
    }
}

/// Message suitable for display for a bare API failure.
#[must_use]
pub fn api_user_message(err: &ApiError) -> String {
    if err.is_transport() {
        return TRY_AGAIN.to_string();
    }
    match err {
        ApiError::Rejected { message, .. } | ApiError::NotFound(message) => message.clone(),
        ApiError::Unauthorized => "Your login has expired. Please sign in again.".to_string(),
        ApiError::Transport(_) | ApiError::Malformed(_) | ApiError::RateLimited(_) => {
            TRY_AGAIN.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_maps_to_unavailable() {
        let err = CartError::from_api(
            ApiError::Rejected {
                status: 409,
                message: "Only 1 left".to_string(),
            },
            Some(ProductId::new(7)),
        );
        assert!(matches!(
            &err,
            CartError::Unavailable { product_id, .. } if *product_id == ProductId::new(7)
        ));
        assert_eq!(err.user_message(), "Only 1 left");
    }

    #[test]
    fn test_conflict_without_message_gets_default_reason() {
        let err = CartError::from_api(
            ApiError::Rejected {
                status: 409,
                message: String::new(),
            },
            Some(ProductId::new(7)),
        );
        assert_eq!(err.user_message(), "Not enough stock available");
    }

    #[test]
    fn test_malformed_reads_as_try_again() {
        let malformed = CartError::from(ApiError::Malformed("expected array".to_string()));
        let transport = CartError::from(ApiError::Transport("refused".to_string()));
        assert!(malformed.is_transport());
        assert_eq!(malformed.user_message(), transport.user_message());
    }

    #[test]
    fn test_server_outage_reads_as_try_again() {
        let err = CartError::from_api(
            ApiError::Rejected {
                status: 503,
                message: "Server error: 503 Service Unavailable".to_string(),
            },
            Some(ProductId::new(1)),
        );
        assert!(matches!(err, CartError::Transport(_)));
        assert!(err.is_transport());
        assert_eq!(err.user_message(), TRY_AGAIN);
    }

    #[test]
    fn test_rejection_keeps_server_reason() {
        let err = CartError::from(ApiError::Rejected {
            status: 400,
            message: "Unknown line".to_string(),
        });
        assert_eq!(err.user_message(), "Unknown line");
    }

    #[test]
    fn test_checkout_wraps_cart_messages() {
        let err = CheckoutError::from(CartError::Busy);
        assert_eq!(err.user_message(), CartError::Busy.user_message());
        assert_eq!(
            CheckoutError::MissingField("name").user_message(),
            "Please fill in name."
        );
    }
}
