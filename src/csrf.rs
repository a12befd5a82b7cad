//! CSRF cookie bootstrap.
//!
//! `GET {sanctum_base}/csrf-cookie` makes the backend set the `XSRF-TOKEN`
//! cookie, which the interceptor in [`crate::http`] mirrors into the
//! `X-XSRF-TOKEN` header of every later request.

use reqwest::Method;

use crate::error::ApiError;
use crate::http::ApiClient;

pub const CSRF_COOKIE_PATH: &str = "/csrf-cookie";

/// Ask the backend for a fresh CSRF cookie.
///
/// # Errors
///
/// Returns the transport or status error. The failure is also logged.
pub async fn initialize_csrf(client: &ApiClient) -> Result<(), ApiError> {
    let url = client.sanctum_url(CSRF_COOKIE_PATH);
    let result = client.send_unit(client.request(Method::GET, &url)).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, %url, "failed to fetch CSRF cookie");
    }
    result
}

/// Best-effort bootstrap: the failure is logged and otherwise ignored, so a
/// missing cookie surfaces as a CSRF rejection on the request that needs it.
pub async fn ensure_csrf(client: &ApiClient) {
    let _ = initialize_csrf(client).await;
}

#[cfg(test)]
#[path = "csrf_test.rs"]
mod tests;
