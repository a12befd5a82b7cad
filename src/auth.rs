//! Authentication session store.
//!
//! DESIGN
//! ======
//! Two stable states: unauthenticated (initial) and authenticated. Only
//! `check_auth`, `login` and `logout` move between them. The source of
//! truth for "who am I" is always `GET {api_base}/user`; the login response
//! body is ignored and a successful login is followed by a `check_auth`.
//!
//! Every session call re-issues the CSRF bootstrap first, since the cookie
//! may have expired or never been set on a cold start.
//!
//! STATE EFFECTS
//! =============
//! - `check_auth` failure clears the session, success replaces the user
//! - `register` never touches the session
//! - `logout` clears the session even when the backend call fails

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use reqwest::Method;

use crate::csrf;
use crate::error::ApiError;
use crate::http::{ApiClient, decode};
use crate::models::{Credentials, Envelope, Registration, User};

pub const CURRENT_USER_PATH: &str = "/user";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const LOGOUT_PATH: &str = "/logout";

/// Client-side belief about the current authentication status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
}

impl Session {
    fn authenticated(user: User) -> Self {
        Self { user: Some(user), is_authenticated: true }
    }
}

// =============================================================================
// SESSION AUTHORITY
// =============================================================================

/// What the router guard needs to know about the session.
#[async_trait::async_trait]
pub trait SessionAuthority: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Whether `check_auth` has completed at least once.
    fn has_checked(&self) -> bool;

    async fn check_auth(&self) -> Result<User, ApiError>;
}

// =============================================================================
// AUTH STORE
// =============================================================================

pub struct AuthStore {
    client: ApiClient,
    session: RwLock<Session>,
    checked: AtomicBool,
}

impl AuthStore {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client, session: RwLock::new(Session::default()), checked: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.read().unwrap_or_else(PoisonError::into_inner).is_authenticated
    }

    #[must_use]
    pub fn has_checked(&self) -> bool {
        self.checked.load(Ordering::Acquire)
    }

    /// Verify the session against the backend and materialize the user.
    ///
    /// # Errors
    ///
    /// Any failure (network, 401, empty body) is returned after the session
    /// has been cleared.
    pub async fn check_auth(&self) -> Result<User, ApiError> {
        csrf::ensure_csrf(&self.client).await;

        let result = self.fetch_current_user().await;
        self.checked.store(true, Ordering::Release);

        match result {
            Ok(user) => {
                tracing::debug!(user_id = user.id, "session verified");
                self.replace_session(Session::authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "session verification failed");
                self.replace_session(Session::default());
                Err(e)
            }
        }
    }

    /// Post credentials, then materialize the session with [`AuthStore::check_auth`].
    ///
    /// # Errors
    ///
    /// Returns the login failure (the session is left as it was), or the
    /// follow-up `check_auth` failure (the session is cleared).
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        csrf::ensure_csrf(&self.client).await;

        let credentials = Credentials { email: email.to_owned(), password: password.to_owned() };
        let url = self.client.origin_url(LOGIN_PATH);
        if let Err(e) = self
            .client
            .send_unit(self.client.with_json(Method::POST, &url, &credentials))
            .await
        {
            tracing::error!(error = %e, "login failed");
            return Err(e);
        }

        self.check_auth().await
    }

    /// Create an account. Does not authenticate.
    ///
    /// # Errors
    ///
    /// Returns the transport or validation failure.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError> {
        csrf::ensure_csrf(&self.client).await;

        let registration = Registration::new(name, email, password);
        let url = self.client.origin_url(REGISTER_PATH);
        let result = self
            .client
            .send_unit(self.client.with_json(Method::POST, &url, &registration))
            .await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "registration failed");
        }
        result
    }

    /// End the session on the backend. Local state is cleared regardless of
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Returns the backend failure, after the local session was cleared.
    pub async fn logout(&self) -> Result<(), ApiError> {
        csrf::ensure_csrf(&self.client).await;

        let url = self.client.origin_url(LOGOUT_PATH);
        let result = self
            .client
            .send_unit(self.client.with_json(Method::POST, &url, &serde_json::json!({})))
            .await;
        self.replace_session(Session::default());

        if let Err(e) = &result {
            tracing::error!(error = %e, "logout failed; local session cleared anyway");
        }
        result
    }

    async fn fetch_current_user(&self) -> Result<User, ApiError> {
        let url = self.client.api_url(CURRENT_USER_PATH);
        let body = self.client.execute(self.client.request(Method::GET, &url)).await?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(ApiError::EmptySession);
        }
        decode::<Envelope<User>>(trimmed).map(Envelope::into_inner)
    }

    fn replace_session(&self, session: Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}

#[async_trait::async_trait]
impl SessionAuthority for AuthStore {
    fn is_authenticated(&self) -> bool {
        AuthStore::is_authenticated(self)
    }

    fn has_checked(&self) -> bool {
        AuthStore::has_checked(self)
    }

    async fn check_auth(&self) -> Result<User, ApiError> {
        AuthStore::check_auth(self).await
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
