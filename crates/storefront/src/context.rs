//! Explicit per-session context.
//!
//! The session token and the optional operator credential are resolved once,
//! at startup, and handed to every component that needs them. Nothing deeper
//! in the call graph reads them from ambient storage.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

use resale_core::SessionToken;

/// Session token plus optional bearer credential.
///
/// Cheaply cloneable; clones share the credential slot so that dropping a
/// rejected credential is seen by every holder.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionContextInner>,
}

struct SessionContextInner {
    session: SessionToken,
    credential: RwLock<Option<SecretString>>,
}

impl SessionContext {
    /// Context for an anonymous shopper.
    #[must_use]
    pub fn new(session: SessionToken) -> Self {
        Self::with_credential(session, None)
    }

    /// Context with an optional bearer credential (operators).
    #[must_use]
    pub fn with_credential(session: SessionToken, credential: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(SessionContextInner {
                session,
                credential: RwLock::new(credential),
            }),
        }
    }

    /// The session token scoping the cart.
    #[must_use]
    pub fn session(&self) -> &SessionToken {
        &self.inner.session
    }

    /// The bearer header value, if a credential is held.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|secret| format!("Bearer {}", secret.expose_secret()))
    }

    /// Whether a credential is currently held.
    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Forget the credential after the server rejected it.
    pub fn clear_credential(&self) {
        let previous = self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::warn!(session = %self.session().redacted(), "Credential rejected, cleared");
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", self.session())
            .field(
                "credential",
                &if self.has_credential() {
                    "[REDACTED]"
                } else {
                    "none"
                },
            )
            .finish()
    }
}
