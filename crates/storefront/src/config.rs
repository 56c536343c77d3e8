//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `RESALE_API_URL` - Server origin (default: `http://localhost:55501`); the
//!   API lives under `<origin>/api/`
//! - `RESALE_API_TOKEN` - Operator bearer credential
//! - `RESALE_SESSION_FILE` - Where the session token is persisted
//!   (default: `$HOME/.resale/session`, else `./.resale-session`)
//! - `RESALE_REQUEST_TIMEOUT_SECS` - HTTP timeout (default: 60)
//! - `RESALE_CATALOG_CACHE_TTL_SECS` - Product listing cache TTL (default: 30)

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use resale_core::ReferenceZone;

const DEFAULT_API_URL: &str = "http://localhost:55501";
const DEFAULT_REQUEST_TIMEOUT_SECS: &str = "60";
const DEFAULT_CATALOG_CACHE_TTL_SECS: &str = "30";
const SESSION_FILE_NAME: &str = ".resale-session";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// Remote API settings
    pub api: ApiConfig,
    /// Operator bearer credential
    pub api_token: Option<SecretString>,
    /// Persisted session token location
    pub session_file: PathBuf,
    /// Product listing cache TTL
    pub catalog_cache_ttl_secs: u64,
    /// Zone publication times are defined in
    pub zone: ReferenceZone,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api", &self.api)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_file", &self.session_file)
            .field("catalog_cache_ttl_secs", &self.catalog_cache_ttl_secs)
            .field("zone", &self.zone.name())
            .finish()
    }
}

/// Remote API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server origin, e.g. `http://localhost:55501/`
    pub origin: Url,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// Settings for an origin with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the origin is not an
    /// `http`/`https` URL.
    pub fn new(origin: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: parse_api_url(origin)?,
            request_timeout_secs: 60,
        })
    }

    /// Base URL endpoints are resolved against (`<origin>/api/`).
    #[must_use]
    pub fn api_base(&self) -> Url {
        self.origin
            .join("api/")
            .unwrap_or_else(|_| self.origin.clone())
    }

    /// Origin as a string without the trailing slash, for image URLs.
    #[must_use]
    pub fn origin_str(&self) -> &str {
        self.origin.as_str().trim_end_matches('/')
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let origin = parse_api_url(&get_env_or_default("RESALE_API_URL", DEFAULT_API_URL))?;
        let request_timeout_secs = parse_secs(
            "RESALE_REQUEST_TIMEOUT_SECS",
            &get_env_or_default("RESALE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        let catalog_cache_ttl_secs = parse_secs(
            "RESALE_CATALOG_CACHE_TTL_SECS",
            &get_env_or_default(
                "RESALE_CATALOG_CACHE_TTL_SECS",
                DEFAULT_CATALOG_CACHE_TTL_SECS,
            ),
        )?;
        let api_token = get_optional_env("RESALE_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);
        let session_file = get_optional_env("RESALE_SESSION_FILE").map_or_else(
            || default_session_file(get_optional_env("HOME").as_deref()),
            PathBuf::from,
        );

        Ok(Self {
            api: ApiConfig {
                origin,
                request_timeout_secs,
            },
            api_token,
            session_file,
            catalog_cache_ttl_secs,
            zone: ReferenceZone::MOSCOW,
        })
    }

    /// The operator credential, required by announcement management.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `RESALE_API_TOKEN` was not set.
    pub fn require_api_token(&self) -> Result<&SecretString, ConfigError> {
        self.api_token
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("RESALE_API_TOKEN".to_string()))
    }

    /// Configuration for a given origin with every other setting defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the origin is not a valid URL.
    pub fn for_origin(origin: &str, session_file: PathBuf) -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::new(origin)?,
            api_token: None,
            session_file,
            catalog_cache_ttl_secs: 30,
            zone: ReferenceZone::MOSCOW,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse and normalise the server origin so it always ends with `/`.
fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidEnvVar("RESALE_API_URL".to_string(), msg);

    let mut url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// `$HOME/.resale/session`, or `./.resale-session` without a home directory.
fn default_session_file(home: Option<&str>) -> PathBuf {
    match home.filter(|h| !h.is_empty()) {
        Some(home) => PathBuf::from(home).join(".resale").join("session"),
        None => PathBuf::from(SESSION_FILE_NAME),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_appends_api_segment() {
        let api = ApiConfig::new("http://localhost:55501").unwrap();
        assert_eq!(api.api_base().as_str(), "http://localhost:55501/api/");
        assert_eq!(api.origin_str(), "http://localhost:55501");
    }

    #[test]
    fn test_api_base_keeps_path_prefix() {
        let api = ApiConfig::new("https://shop.example.ru/backend").unwrap();
        assert_eq!(api.api_base().as_str(), "https://shop.example.ru/backend/api/");
    }

    #[test]
    fn test_parse_api_url_rejects_other_schemes() {
        let result = parse_api_url("ftp://shop.example.ru");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
        assert!(parse_api_url("not a url").is_err());
    }

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs("T", "60").unwrap(), 60);
        assert!(parse_secs("T", "0").is_err());
        assert!(parse_secs("T", "soon").is_err());
    }

    #[test]
    fn test_default_session_file() {
        assert_eq!(
            default_session_file(Some("/home/anna")),
            PathBuf::from("/home/anna/.resale/session")
        );
        assert_eq!(default_session_file(None), PathBuf::from(".resale-session"));
        assert_eq!(default_session_file(Some("")), PathBuf::from(".resale-session"));
    }

    #[test]
    fn test_require_api_token() {
        let config =
            StorefrontConfig::for_origin("http://localhost:55501", PathBuf::from("s")).unwrap();
        assert!(matches!(
            config.require_api_token(),
            Err(ConfigError::MissingEnvVar(name)) if name == "RESALE_API_TOKEN"
        ));
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let mut config =
            StorefrontConfig::for_origin("http://localhost:55501", PathBuf::from("s")).unwrap();
        config.api_token = Some(SecretString::from("super_secret_operator_token"));

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(debug_output.contains("Europe/Moscow"));
        assert!(!debug_output.contains("super_secret_operator_token"));
    }
}
