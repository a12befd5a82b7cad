//! Client configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::ApiError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_BASE: &str = "/api";
pub const DEFAULT_SANCTUM_BASE: &str = "/sanctum";
pub const DEFAULT_TOKEN_FILE: &str = ".taskdesk/storage.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// How overlapping `fetch_tasks` responses are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchOrdering {
    /// Every successful response overwrites the list, whichever lands last.
    #[default]
    LastResponseWins,
    /// Responses belonging to a superseded request are discarded.
    LatestRequestWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API origin, e.g. `http://localhost:8000`. Never ends with `/`.
    pub api_url: String,
    /// Prefix for resource endpoints, e.g. `/api`.
    pub api_base: String,
    /// Prefix for the CSRF cookie endpoint, e.g. `/sanctum`.
    pub sanctum_base: String,
    /// Local-storage file holding the bearer token.
    pub token_file: PathBuf,
    pub timeouts: HttpTimeouts,
    pub fetch_ordering: FetchOrdering,
}

impl ClientConfig {
    /// Config pointed at `api_url` with every other value defaulted.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if `api_url` is not an absolute http(s) URL.
    pub fn new(api_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            api_url: parse_origin(api_url)?,
            api_base: normalize_base(DEFAULT_API_BASE),
            sanctum_base: normalize_base(DEFAULT_SANCTUM_BASE),
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
            timeouts: HttpTimeouts::default(),
            fetch_ordering: FetchOrdering::default(),
        })
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `TASKS_API_URL`: API origin (default `http://localhost:8000`)
    /// - `TASKS_API_BASE`: resource prefix (default `/api`)
    /// - `TASKS_SANCTUM_BASE`: CSRF prefix (default `/sanctum`)
    /// - `TASKS_TOKEN_FILE`: local-storage file (default `.taskdesk/storage.json`)
    /// - `TASKS_REQUEST_TIMEOUT_SECS`: default 30
    /// - `TASKS_CONNECT_TIMEOUT_SECS`: default 10
    /// - `TASKS_FETCH_ORDERING`: `last_response` (default) or `latest_request`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] on an invalid origin or ordering mode.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] on an invalid origin or ordering mode.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_url = parse_origin(&get("TASKS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_owned()))?;
        let api_base = normalize_base(&get("TASKS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()));
        let sanctum_base =
            normalize_base(&get("TASKS_SANCTUM_BASE").unwrap_or_else(|| DEFAULT_SANCTUM_BASE.to_owned()));
        let token_file = PathBuf::from(get("TASKS_TOKEN_FILE").unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_owned()));
        let timeouts = HttpTimeouts {
            request_secs: parse_secs(get("TASKS_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_secs(get("TASKS_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let fetch_ordering = parse_fetch_ordering(get("TASKS_FETCH_ORDERING").as_deref())?;

        Ok(Self { api_url, api_base, sanctum_base, token_file, timeouts, fetch_ordering })
    }
}

/// Zero would time every request out immediately, so it counts as unset.
fn parse_secs(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).filter(|secs| *secs > 0).unwrap_or(default)
}

fn parse_fetch_ordering(raw: Option<&str>) -> Result<FetchOrdering, ApiError> {
    match raw.map(str::trim).unwrap_or("last_response") {
        "last_response" => Ok(FetchOrdering::LastResponseWins),
        "latest_request" => Ok(FetchOrdering::LatestRequestWins),
        other => Err(ApiError::Config(format!(
            "unsupported TASKS_FETCH_ORDERING '{other}' (expected 'last_response' or 'latest_request')"
        ))),
    }
}

fn parse_origin(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|e| ApiError::Config(format!("invalid TASKS_API_URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ApiError::Config(format!("TASKS_API_URL must be an http(s) origin, got '{raw}'")));
    }
    Ok(trimmed.to_owned())
}

/// `api/` -> `/api`, `/` -> ``.
fn normalize_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("/{trimmed}")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
