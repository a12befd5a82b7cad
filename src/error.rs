//! Client error taxonomy.
//!
//! DESIGN
//! ======
//! Every store operation returns `Result<_, ApiError>`. Transport failures,
//! auth rejections, validation rejections and server faults are separate
//! variants so callers can branch on the class of failure instead of
//! inspecting raw status codes.

use std::collections::BTreeMap;

use serde::Deserialize;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by the API client and the stores built on it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Config(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The backend was unreachable, the connection dropped, or the request timed out.
    #[error("network failure: {0}")]
    Network(String),

    /// The backend rejected the credentials (401/403).
    #[error("authentication failed: status {status}")]
    Auth { status: u16 },

    /// The backend rejected the CSRF token (Laravel answers 419).
    #[error("CSRF token mismatch")]
    CsrfMismatch,

    /// The current-user endpoint answered 2xx without user data.
    #[error("no user data received")]
    EmptySession,

    /// The backend rejected the request payload (any other 4xx).
    #[error("validation failed: {message}")]
    Validation { status: u16, message: String, fields: BTreeMap<String, Vec<String>> },

    /// The backend failed while handling the request (5xx).
    #[error("server error: status {status}")]
    Server { status: u16, body: String },

    /// Any other non-success status (e.g. an unfollowed redirect).
    #[error("unexpected response status {status}")]
    UnexpectedStatus { status: u16 },

    /// A success body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Decode(String),

    /// The local token storage could not be read or written.
    #[error("token storage failed: {0}")]
    Storage(String),
}

/// Laravel-style error body: `{ "message": "...", "errors": { "field": ["..."] } }`.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
    /// Classify a non-success response by status code and body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Auth { status },
            419 => Self::CsrfMismatch,
            400..=499 => {
                let parsed = serde_json::from_str::<ErrorBody>(body).ok();
                let (message, fields) = match parsed {
                    Some(parsed) => (parsed.message.unwrap_or_else(|| default_message(status)), parsed.errors),
                    None => (default_message(status), BTreeMap::new()),
                };
                Self::Validation { status, message, fields }
            }
            500..=599 => Self::Server { status, body: body.to_owned() },
            _ => Self::UnexpectedStatus { status },
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Network(_) => "E_NETWORK",
            Self::Auth { .. } => "E_AUTH",
            Self::CsrfMismatch => "E_CSRF_MISMATCH",
            Self::EmptySession => "E_EMPTY_SESSION",
            Self::Validation { .. } => "E_VALIDATION",
            Self::Server { .. } => "E_SERVER",
            Self::UnexpectedStatus { .. } => "E_UNEXPECTED_STATUS",
            Self::Decode(_) => "E_DECODE",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    /// Whether repeating the same request could plausibly succeed.
    /// Nothing in this crate retries automatically.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. } | Self::Validation { status: 429, .. })
    }

    /// True for failures that mean "no valid session".
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::EmptySession | Self::CsrfMismatch)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

fn default_message(status: u16) -> String {
    format!("request rejected with status {status}")
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
