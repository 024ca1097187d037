//! Client configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::path::PathBuf;

/// Default account API base URL (local development server).
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Client configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the account API, without trailing slash
    pub api_url: String,
    /// Directory backing the durable token scope
    pub storage_dir: PathBuf,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Minimum wait between two resend-activation requests
    pub resend_cooldown_secs: u64,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            storage_dir: PathBuf::from(".authflow"),
            request_timeout_secs: 30,
            resend_cooldown_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset values fall back to the defaults
    /// used for local development. Values that are set but malformed are an
    /// error rather than silently replaced.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            api_url: normalize_base_url(
                &env::var("API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            ),
            storage_dir: env::var("AUTH_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".authflow")),
            request_timeout_secs: parse_secs("REQUEST_TIMEOUT_SECS", 30)?,
            resend_cooldown_secs: parse_secs("RESEND_COOLDOWN_SECS", 60)?,
        })
    }

    /// Override the API base URL (e.g. from a CLI flag).
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = normalize_base_url(api_url);
        self
    }
}

/// Strip surrounding whitespace and trailing slashes so paths can be appended.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_secs(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
