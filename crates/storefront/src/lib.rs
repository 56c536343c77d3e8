//! Resale Storefront library.
//!
//! The client core of the resale shop: a cart that converges on the server's
//! authoritative state, availability ceilings that account for other
//! shoppers' reservations, scheduled publication in shop time, and a
//! persistent anonymous session identity.
//!
//! # Modules
//!
//! - [`session`] - Anonymous session token, created once and persisted
//! - [`context`] - Session token and credential passed to every remote call
//! - [`publication`] - Scheduled visibility in the shop's civil time
//! - [`cart`] - Availability model and the cart reconciliation engine
//! - [`api`] - Remote API contract and its HTTP implementation
//! - [`catalog`] - Product listings with caching and publication filtering
//! - [`checkout`] - Order placement
//! - [`announcements`] - Operator-scheduled product announcements
//! - [`state`] - Everything above wired together for one session

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod announcements;
pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod context;
pub mod error;
pub mod publication;
pub mod session;
pub mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use state::Storefront;
