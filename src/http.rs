//! Configured HTTP client for the task backend.
//!
//! DESIGN
//! ======
//! One `reqwest::Client` per [`ApiClient`], sharing a cookie jar for the
//! lifetime of the client so the backend session cookie and the
//! `XSRF-TOKEN` cookie ride along on every request. Every request passes
//! through [`ApiClient::request`], the interceptor stage:
//! - `Authorization: Bearer <token>` when the token store holds one
//! - `X-XSRF-TOKEN` mirrored from the `XSRF-TOKEN` cookie
//!
//! The cookie session is the authoritative credential. The bearer token is
//! a fallback that is attached when present and never validated here.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::Envelope;
use crate::token::TokenStore;

pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";
pub const REQUESTED_WITH_HEADER: &str = "X-Requested-With";

// =============================================================================
// CLIENT
// =============================================================================

/// Shared request client. Cheap to clone; clones share cookies and tokens.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    jar: Arc<Jar>,
    origin: Url,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Build a client pointed at `config.api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is invalid or the HTTP client fails to build.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let origin = Url::parse(&config.api_url).map_err(|e| ApiError::Config(format!("invalid API origin: {e}")))?;
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(REQUESTED_WITH_HEADER, HeaderValue::from_static("XMLHttpRequest"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;

        Ok(Self { inner: Arc::new(ClientInner { http, jar, origin, config, tokens }) })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    /// `{origin}{api_base}{path}`, e.g. `http://localhost:8000/api/tasks`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{path}", self.inner.config.api_url, self.inner.config.api_base)
    }

    /// `{origin}{path}`, used by the session endpoints (`/login`, `/logout`, ...).
    #[must_use]
    pub fn origin_url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.config.api_url)
    }

    /// `{origin}{sanctum_base}{path}`.
    #[must_use]
    pub fn sanctum_url(&self, path: &str) -> String {
        format!("{}{}{path}", self.inner.config.api_url, self.inner.config.sanctum_base)
    }

    /// Decoded value of the `XSRF-TOKEN` cookie currently held for the origin.
    #[must_use]
    pub fn xsrf_token(&self) -> Option<String> {
        let header = self.inner.jar.cookies(&self.inner.origin)?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == XSRF_COOKIE)
            .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
    }

    /// Start a request with the interceptor headers applied.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        tracing::debug!(%method, %url, "dispatching request");
        let mut builder = self.inner.http.request(method, url);

        match self.inner.tokens.load() {
            Ok(Some(token)) => builder = builder.bearer_auth(token),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "bearer token unavailable; sending without Authorization"),
        }

        if let Some(xsrf) = self.xsrf_token() {
            builder = builder.header(XSRF_HEADER, xsrf);
        }

        builder
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Send and return the raw body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Transport failures map to [`ApiError::Network`]; non-2xx statuses are
    /// classified by [`ApiError::from_status`].
    pub async fn execute(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), %url, "request rejected");
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    /// Send and decode a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]; a body of the wrong shape is [`ApiError::Decode`].
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(builder).await?;
        decode(&body)
    }

    /// Send and decode a resource body, bare or wrapped in `{ "data": ... }`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send_json`].
    pub async fn send_resource<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(builder).await?;
        decode::<Envelope<T>>(&body).map(Envelope::into_inner)
    }

    /// Send and discard the body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`].
    pub async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.execute(builder).await.map(|_| ())
    }

    /// `GET` with query parameters.
    pub fn get<Q: Serialize + ?Sized>(&self, url: &str, query: &Q) -> RequestBuilder {
        self.request(Method::GET, url).query(query)
    }

    /// Request with a JSON body.
    pub fn with_json<B: Serialize + ?Sized>(&self, method: Method, url: &str, body: &B) -> RequestBuilder {
        self.request(method, url).json(body)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
