//! Core types for the resale shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod civil_time;
pub mod id;
pub mod phone;
pub mod price;
pub mod session;
pub mod status;

pub use civil_time::{CivilDateTime, CivilTimeError, ReferenceZone};
pub use id::*;
pub use phone::{Phone, PhoneError};
pub use price::Price;
pub use session::{SessionToken, SessionTokenError};
pub use status::*;
