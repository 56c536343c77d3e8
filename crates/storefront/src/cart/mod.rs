//! Session cart: snapshot, availability ceilings and the reconciliation engine.
//!
//! The server is the source of truth for the cart and for stock. The local
//! [`CartSnapshot`] is only ever replaced wholesale by a refetch, and the
//! [`AvailabilityModel`] only trusts server figures reported since the last
//! mutation.

mod availability;
mod snapshot;
mod store;

pub use availability::AvailabilityModel;
pub use snapshot::{CartLine, CartSnapshot};
pub use store::{CartPhase, CartStore, MutationPolicy};
