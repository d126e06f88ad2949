//! Environment-driven configuration.
//!
//! Variables:
//! - `PAGEMARK_BACKEND_URL` (default `http://localhost:5000`)
//! - `PAGEMARK_TIMEOUT_MS` (default 10000)
//! - `PAGEMARK_RETRY_DELAY_MS` (default 1000)
//! - `PAGEMARK_HIGHLIGHT_COLOR` (default `yellow`)
//! - `PAGEMARK_EXTRA_EXCLUDES` (comma-separated URL substrings)

use crate::exclusion::ExclusionList;
use pagemark_core::{Error, Result, DEFAULT_HIGHLIGHT_COLOR};
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: url::Url,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub highlight_color: String,
    pub exclusions: ExclusionList,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_backend(None)
    }

    /// Like [`Config::from_env`], but `backend` (when given) replaces
    /// `PAGEMARK_BACKEND_URL`, which is then not read at all.
    pub fn from_env_with_backend(backend: Option<&str>) -> Result<Self> {
        let backend = match backend {
            Some(b) => b.to_string(),
            None => env("PAGEMARK_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
        };
        Ok(Self {
            backend_url: parse_backend_url(&backend)?,
            timeout: Duration::from_millis(env_u64("PAGEMARK_TIMEOUT_MS", 10_000).clamp(100, 600_000)),
            retry_delay: Duration::from_millis(env_u64("PAGEMARK_RETRY_DELAY_MS", 1_000).min(60_000)),
            highlight_color: highlight_color_from_env(),
            exclusions: exclusions_from_env(),
        })
    }
}

/// `PAGEMARK_HIGHLIGHT_COLOR`, or yellow.
pub fn highlight_color_from_env() -> String {
    env("PAGEMARK_HIGHLIGHT_COLOR").unwrap_or_else(|| DEFAULT_HIGHLIGHT_COLOR.to_string())
}

/// Default exclusions plus `PAGEMARK_EXTRA_EXCLUDES`.
pub fn exclusions_from_env() -> ExclusionList {
    let extra = env("PAGEMARK_EXTRA_EXCLUDES").unwrap_or_default();
    ExclusionList::with_extra(extra.split(','))
}

/// Parse a backend base URL; only http(s) is accepted.
pub fn parse_backend_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    match u.scheme() {
        "http" | "https" => Ok(u),
        other => Err(Error::Config(format!(
            "backend url must be http(s), got scheme {other}"
        ))),
    }
}
