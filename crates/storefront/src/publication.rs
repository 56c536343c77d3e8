//! Scheduled publication.
//!
//! A product's `publishedAt` is a civil reading in the business timezone.
//! Visibility is decided by normalising `now` into that same zone and
//! comparing wall-clock readings at minute precision, so a shopper and an
//! operator in different device timezones always agree.

use chrono::{DateTime, Utc};
use tracing::warn;

use resale_core::{CivilDateTime, ReferenceZone};

use crate::api::Product;

/// A product's scheduled publication, as interpreted from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationInstant {
    /// No schedule: visible immediately.
    Immediate,
    /// Visible from this civil reading on.
    At(CivilDateTime),
    /// The server sent something unreadable.
    Malformed(String),
}

impl PublicationInstant {
    /// Interpret a raw `publishedAt` value. `None` and blank strings mean
    /// "immediately visible".
    #[must_use]
    pub fn parse(raw: Option<&str>, zone: ReferenceZone) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Immediate,
            Some(value) => CivilDateTime::parse_wire(value, zone)
                .map_or_else(|_| Self::Malformed(value.to_string()), Self::At),
        }
    }

    /// The civil reading, if one is scheduled.
    #[must_use]
    pub const fn civil(&self) -> Option<CivilDateTime> {
        match self {
            Self::At(civil) => Some(*civil),
            Self::Immediate | Self::Malformed(_) => None,
        }
    }
}

impl From<Option<CivilDateTime>> for PublicationInstant {
    fn from(value: Option<CivilDateTime>) -> Self {
        value.map_or(Self::Immediate, Self::At)
    }
}

/// Decides whether scheduled items are visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicationClock {
    zone: ReferenceZone,
}

impl PublicationClock {
    /// A clock for the given reference zone.
    #[must_use]
    pub const fn new(zone: ReferenceZone) -> Self {
        Self { zone }
    }

    /// The reference zone.
    #[must_use]
    pub const fn zone(&self) -> ReferenceZone {
        self.zone
    }

    /// `now` as a civil reading in the reference zone.
    #[must_use]
    pub fn civil_now(&self, now: DateTime<Utc>) -> CivilDateTime {
        CivilDateTime::from_utc(now, self.zone)
    }

    /// Whether an item with this publication instant is visible at `now`.
    ///
    /// Never fails: a malformed instant is treated as already visible.
    #[must_use]
    pub fn is_visible(&self, instant: &PublicationInstant, now: DateTime<Utc>) -> bool {
        match instant {
            PublicationInstant::Immediate => true,
            PublicationInstant::At(publish_at) => self.civil_now(now) >= *publish_at,
            PublicationInstant::Malformed(raw) => {
                warn!(raw = %raw, "Unreadable publication time, treating as visible");
                true
            }
        }
    }

    /// Whether `product` is visible at `now`.
    #[must_use]
    pub fn is_product_visible(&self, product: &Product, now: DateTime<Utc>) -> bool {
        self.is_visible(&product.publication(self.zone), now)
    }

    /// The instant from which `product` becomes visible, if it is scheduled.
    #[must_use]
    pub fn visible_from(&self, product: &Product) -> Option<DateTime<Utc>> {
        product
            .publication(self.zone)
            .civil()
            .map(|civil| civil.to_utc(self.zone))
    }
}
