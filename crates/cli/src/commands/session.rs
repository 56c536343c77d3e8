//! Session token commands.
//!
//! # Usage
//!
//! ```bash
//! resale session show
//! resale session reset
//! ```

use resale_storefront::Storefront;

use super::CliError;

/// Print the session token in use.
#[must_use]
pub fn show(shop: &Storefront) -> String {
    let ctx = shop.context();
    let credential = if ctx.has_credential() {
        "operator credential configured"
    } else {
        "no operator credential"
    };
    format!(
        "Session: {}\nStored in: {}\n({credential})",
        ctx.session(),
        shop.config().session_file.display()
    )
}

/// Forget the persisted session. The next command starts a new one with an
/// empty cart.
///
/// # Errors
///
/// Returns an error if the session file cannot be removed.
pub fn reset(shop: &Storefront) -> Result<String, CliError> {
    shop.identity().reset()?;
    tracing::info!(session = %shop.context().session().redacted(), "Session reset");
    Ok("Session reset. A new session will be created on the next command.".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use resale_storefront::testing::FakeStore;

    use super::*;
    use crate::commands::test_support::storefront;

    #[test]
    fn test_show_and_reset() {
        let dir = TempDir::new().unwrap();
        let fake = FakeStore::new();
        let shop = storefront(&fake, &dir);
        let token = shop.context().session().to_string();

        let out = show(&shop);
        assert!(out.contains(&token));
        assert!(out.contains("no operator credential"));

        reset(&shop).unwrap();
        assert!(!dir.path().join("session").exists());

        let next = storefront(&fake, &dir);
        assert_ne!(next.context().session().to_string(), token);
    }
}
