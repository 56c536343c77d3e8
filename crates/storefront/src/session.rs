//! Stable anonymous session identity.
//!
//! The token is created lazily on first access, persisted through a
//! [`TokenStore`], and returned unchanged for as long as the store keeps it.
//! [`SessionIdentity::get_or_create`] never fails: when persistence is
//! unavailable the token lives in memory for the rest of the process.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rand::seq::IndexedRandom;
use tracing::{debug, warn};

use resale_core::SessionToken;

const TOKEN_PREFIX: &str = "session_";
const RANDOM_SUFFIX_LEN: usize = 13;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Persisted key-value slot holding the session token.
pub trait TokenStore: Send + Sync {
    /// Read the stored token, `Ok(None)` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load(&self) -> io::Result<Option<String>>;

    /// Persist `token`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn save(&self, token: &str) -> io::Result<()>;

    /// Remove the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn clear(&self) -> io::Result<()>;
}

/// Token stored in a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// A store backed by `path`. Parent directories are created on save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a half-written token.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, token)?;
        std::fs::rename(&tmp, &self.path)
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Token held in process memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Produces and remembers the session token.
pub struct SessionIdentity {
    store: Box<dyn TokenStore>,
    current: Mutex<Option<SessionToken>>,
}

impl SessionIdentity {
    /// Identity backed by `store`.
    #[must_use]
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            current: Mutex::new(None),
        }
    }

    /// Identity persisted in a file.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileTokenStore::new(path))
    }

    /// Identity that does not survive the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    /// Return the session token, creating and persisting one on first use.
    pub fn get_or_create(&self) -> SessionToken {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            return token.clone();
        }

        let token = self.load_stored().unwrap_or_else(|| {
            let token = generate_token();
            match self.store.save(token.as_str()) {
                Ok(()) => debug!(session = %token.redacted(), "Created session token"),
                Err(e) => warn!(
                    error = %e,
                    session = %token.redacted(),
                    "Failed to persist session token, keeping it in memory"
                ),
            }
            token
        });

        *current = Some(token.clone());
        token
    }

    /// Forget the token so the next access creates a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted token cannot be removed.
    pub fn reset(&self) -> io::Result<()> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.clear()
    }

    fn load_stored(&self) -> Option<SessionToken> {
        match self.store.load() {
            Ok(Some(raw)) => match SessionToken::parse(&raw) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(error = %e, "Stored session token is invalid, generating a new one");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field(
                "current",
                &*self.current.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .finish_non_exhaustive()
    }
}

/// A fresh token: `session_<unix millis>_<13 base36 chars>`.
#[must_use]
pub fn generate_token() -> SessionToken {
    let mut rng = rand::rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36.choose(&mut rng).map_or('0', |b| char::from(*b)))
        .collect();
    let raw = format!("{TOKEN_PREFIX}{}_{suffix}", Utc::now().timestamp_millis());
    // Prefix, digits and the base36 alphabet always form a valid token.
    SessionToken::parse(&raw).unwrap_or_else(|_| unreachable!("generated token {raw} is invalid"))
}
