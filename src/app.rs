//! Application context.
//!
//! DESIGN
//! ======
//! `AppContext` owns one `ApiClient` and the stores built on it. Anything
//! that needs the session or the task list receives the context (or one of
//! its `Arc` fields) explicitly. Dropping the context drops the cookie jar,
//! so a new context starts from a cold session.

use std::sync::Arc;

use crate::auth::{AuthStore, SessionAuthority};
use crate::config::ClientConfig;
use crate::csrf;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::router::RouterGuard;
use crate::tasks::TaskStore;
use crate::token::{FileTokenStore, TokenStore};

#[derive(Clone)]
pub struct AppContext {
    pub client: ApiClient,
    pub auth: Arc<AuthStore>,
    pub tasks: Arc<TaskStore>,
    pub router: RouterGuard,
}

impl AppContext {
    /// Build the context with the bearer token kept in `config.token_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built. A failed CSRF
    /// bootstrap is logged, not returned.
    pub async fn bootstrap(config: ClientConfig) -> Result<Self, ApiError> {
        let tokens = Arc::new(FileTokenStore::new(config.token_file.clone()));
        Self::with_tokens(config, tokens).await
    }

    /// Like [`AppContext::bootstrap`] with an explicit token store.
    ///
    /// # Errors
    ///
    /// See [`AppContext::bootstrap`].
    pub async fn with_tokens(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let client = ApiClient::new(config, tokens)?;
        tracing::info!(api_url = %client.config().api_url, "starting task client");

        csrf::ensure_csrf(&client).await;

        let auth = Arc::new(AuthStore::new(client.clone()));
        let tasks = Arc::new(TaskStore::new(client.clone()));
        let router = RouterGuard::new(Arc::clone(&auth) as Arc<dyn SessionAuthority>);

        Ok(Self { client, auth, tasks, router })
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
