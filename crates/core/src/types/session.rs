//! Anonymous session token.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`SessionToken`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionTokenError {
    /// The input string is empty.
    #[error("session token cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("session token must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace or control characters.
    #[error("session token must not contain whitespace or control characters")]
    InvalidCharacter,
}

/// An opaque per-browser token that scopes an anonymous cart server-side.
///
/// The token is generated once, persisted, and never mutated. It is not a
/// security boundary; it only attributes a reservation to a shopper.
///
/// ## Constraints
///
/// - Length: 1-128 characters
/// - No whitespace or control characters (it travels in a query string)
///
/// ## Examples
///
/// ```
/// use resale_core::SessionToken;
///
/// assert!(SessionToken::parse("session_1700000000000_k3j2h1g0f9e8d").is_ok());
/// assert!(SessionToken::parse("").is_err());
/// assert!(SessionToken::parse("has space").is_err());
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SessionToken(String);

impl SessionToken {
    /// Maximum length of a session token.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a `SessionToken` from a string, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than
    /// [`Self::MAX_LENGTH`], or contains whitespace/control characters.
    pub fn parse(s: &str) -> Result<Self, SessionTokenError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(SessionTokenError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(SessionTokenError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SessionTokenError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A shortened form for log lines.
    #[must_use]
    pub fn redacted(&self) -> String {
        let head: String = self.0.chars().take(12).collect();
        if head.len() == self.0.len() {
            head
        } else {
            format!("{head}…")
        }
    }
}

// Debug is redacted so tokens do not end up verbatim in traces.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionToken").field(&self.redacted()).finish()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionToken {
    type Error = SessionTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}

impl std::str::FromStr for SessionToken {
    type Err = SessionTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
