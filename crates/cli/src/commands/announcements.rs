//! Scheduled announcement commands. These require `RESALE_API_TOKEN`.
//!
//! # Usage
//!
//! ```bash
//! resale announcements list
//!
//! # Times are Moscow time
//! resale announcements create --at 2025-03-01T11:00 --product 12 --product 14
//!
//! resale announcements delete 3
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use resale_core::{AnnouncementId, CivilDateTime, ProductId};
use resale_storefront::Storefront;
use resale_storefront::announcements::AnnouncementDraft;
use resale_storefront::error::AnnouncementError;

use super::CliError;

/// Longest message excerpt shown in listings.
const EXCERPT_CHARS: usize = 50;

/// List every announcement.
///
/// # Errors
///
/// Returns an error if no credential is configured or the request fails.
pub async fn list(shop: &Storefront, now: DateTime<Utc>) -> Result<String, CliError> {
    shop.config().require_api_token()?;
    let service = shop.announcements();
    let announcements = service.list().await?;

    if announcements.is_empty() {
        return Ok("No announcements scheduled.".to_string());
    }

    let mut out = String::new();
    for announcement in &announcements {
        let state = if announcement.is_sent {
            "sent"
        } else if service.is_due(announcement, now) {
            "due"
        } else {
            "pending"
        };
        let _ = writeln!(
            out,
            "#{} {} [{state}] {} product(s): {}",
            announcement.id,
            service.display_time(announcement),
            announcement.product_ids.len(),
            excerpt(&announcement.message)
        );
    }
    Ok(out.trim_end().to_string())
}

/// Schedule an announcement at a Moscow civil time.
///
/// # Errors
///
/// Returns an error for a missing credential, an unreadable time, an invalid
/// draft, or a failed request.
pub async fn create(
    shop: &Storefront,
    at: &str,
    products: &[i64],
    message: Option<String>,
) -> Result<String, CliError> {
    shop.config().require_api_token()?;

    let mut draft = AnnouncementDraft {
        scheduled_at: Some(CivilDateTime::parse_input(at).map_err(AnnouncementError::from)?),
        product_ids: products.iter().copied().map(ProductId::new).collect(),
        ..AnnouncementDraft::default()
    };
    if let Some(message) = message {
        draft.message = message;
    }

    let service = shop.announcements();
    let created = service.create(&draft).await?;
    Ok(format!(
        "Announcement #{} scheduled for {} (Moscow time)",
        created.id,
        service.display_time(&created)
    ))
}

/// Delete an announcement.
///
/// # Errors
///
/// Returns an error for a missing credential or a failed request.
pub async fn delete(shop: &Storefront, id: i64) -> Result<String, CliError> {
    shop.config().require_api_token()?;
    let id = AnnouncementId::new(id);
    shop.announcements().delete(id).await?;
    Ok(format!("Announcement #{id} deleted"))
}

fn excerpt(message: &str) -> String {
    let flat = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        flat
    } else {
        let head: String = flat.chars().take(EXCERPT_CHARS).collect();
        format!("{head}...")
    }
}
