//! Scheduled product announcements.
//!
//! Operators type the send time as Moscow civil time. It is converted to an
//! absolute instant exactly once, when the request is built, and instants
//! coming back from the server are shown as Moscow civil time again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use resale_core::{AnnouncementId, CivilDateTime, ProductId, ReferenceZone};

use crate::api::{Announcement, AnnouncementRequest, ApiError, StoreApi};
use crate::context::SessionContext;
use crate::error::AnnouncementError;
use crate::publication::{PublicationClock, PublicationInstant};

/// Message prefilled for a new announcement.
pub const DEFAULT_MESSAGE: &str = "Анонс!

Всем доброе утречко ☕
Сегодня в 11:00 (по мск) обзор новинок для наших мальчишек/девочек 🐧

Всех очень жду🍬";

/// An announcement being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementDraft {
    pub message: String,
    pub scheduled_at: Option<CivilDateTime>,
    pub product_ids: Vec<ProductId>,
}

impl Default for AnnouncementDraft {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_string(),
            scheduled_at: None,
            product_ids: Vec::new(),
        }
    }
}

impl AnnouncementDraft {
    /// Toggle a product in the selection.
    pub fn toggle_product(&mut self, id: ProductId) {
        if let Some(pos) = self.product_ids.iter().position(|p| *p == id) {
            self.product_ids.remove(pos);
        } else {
            self.product_ids.push(id);
        }
    }

    /// Validate and convert into a request, reading the schedule in `zone`.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: missing schedule, no products,
    /// or a blank message.
    pub fn to_request(
        &self,
        zone: ReferenceZone,
    ) -> Result<AnnouncementRequest, AnnouncementError> {
        let scheduled_at = self.scheduled_at.ok_or(AnnouncementError::MissingSchedule)?;

        let mut product_ids = Vec::with_capacity(self.product_ids.len());
        for id in &self.product_ids {
            if !product_ids.contains(id) {
                product_ids.push(*id);
            }
        }
        if product_ids.is_empty() {
            return Err(AnnouncementError::NoProducts);
        }
        if self.message.trim().is_empty() {
            return Err(AnnouncementError::EmptyMessage);
        }

        Ok(AnnouncementRequest {
            message: self.message.clone(),
            scheduled_at: scheduled_at.to_utc(zone),
            product_ids,
        })
    }
}

/// Format a server timestamp for operators, in `zone`. Unreadable values are
/// shown as received.
#[must_use]
pub fn display_time(raw: &str, zone: ReferenceZone) -> String {
    CivilDateTime::parse_wire(raw, zone)
        .map_or_else(|_| raw.to_string(), |civil| civil.format_display())
}

/// Announcements API for an operator session.
#[derive(Clone)]
pub struct Announcements {
    inner: Arc<AnnouncementsInner>,
}

struct AnnouncementsInner {
    api: Arc<dyn StoreApi>,
    ctx: SessionContext,
    clock: PublicationClock,
}

impl Announcements {
    #[must_use]
    pub fn new(api: Arc<dyn StoreApi>, ctx: SessionContext, clock: PublicationClock) -> Self {
        Self {
            inner: Arc::new(AnnouncementsInner { api, ctx, clock }),
        }
    }

    /// Every scheduled announcement.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementError::Api` if the list cannot be fetched.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Announcement>, AnnouncementError> {
        let result = self.inner.api.fetch_announcements(&self.inner.ctx).await;
        Ok(self.forget_rejected_credential(result)?)
    }

    /// Schedule a new announcement.
    ///
    /// # Errors
    ///
    /// Returns a validation error without a network call, or
    /// `AnnouncementError::Api`.
    #[instrument(skip(self, draft), fields(products = draft.product_ids.len()))]
    pub async fn create(
        &self,
        draft: &AnnouncementDraft,
    ) -> Result<Announcement, AnnouncementError> {
        let request = draft.to_request(self.inner.clock.zone())?;
        let result = self
            .inner
            .api
            .create_announcement(&self.inner.ctx, &request)
            .await;
        let announcement = self.forget_rejected_credential(result)?;
        info!(
            announcement_id = %announcement.id,
            scheduled_at = %request.scheduled_at,
            "Announcement scheduled"
        );
        Ok(announcement)
    }

    /// Delete an announcement.
    ///
    /// # Errors
    ///
    /// Returns `AnnouncementError::Api`, with `ApiError::NotFound` for an
    /// unknown ID.
    #[instrument(skip(self), fields(announcement_id = %id))]
    pub async fn delete(&self, id: AnnouncementId) -> Result<(), AnnouncementError> {
        let result = self.inner.api.delete_announcement(&self.inner.ctx, id).await;
        Ok(self.forget_rejected_credential(result)?)
    }

    /// Whether `announcement` is due at `now`. A malformed schedule is due.
    #[must_use]
    pub fn is_due(&self, announcement: &Announcement, now: DateTime<Utc>) -> bool {
        let clock = self.inner.clock;
        let instant =
            PublicationInstant::parse(Some(announcement.scheduled_at.as_str()), clock.zone());
        clock.is_visible(&instant, now)
    }

    /// The send time shown to operators.
    #[must_use]
    pub fn display_time(&self, announcement: &Announcement) -> String {
        display_time(&announcement.scheduled_at, self.inner.clock.zone())
    }

    fn forget_rejected_credential<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if matches!(result, Err(ApiError::Unauthorized)) {
            self.inner.ctx.clear_credential();
        }
        result
    }
}
