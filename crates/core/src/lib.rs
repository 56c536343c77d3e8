//! Resale Core - Shared types library.
//!
//! This crate provides common types used across all resale shop components:
//! - `storefront` - Cart synchronization, availability and catalog client
//! - `cli` - Command-line storefront client
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no clocks.
//! Anything that needs the current time or the network takes it as an input.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, session tokens, civil time
//!   and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
