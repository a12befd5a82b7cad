//! Route table and navigation guard.
//!
//! DESIGN
//! ======
//! [`decide`] is a pure function of the target route's access rule and the
//! current authentication state. [`RouterGuard`] wraps it with the one
//! side effect navigation may have: the first navigation in a context's
//! lifetime blocks on a single `check_auth` so a cold start with a live
//! session cookie lands on the right page.

use std::sync::Arc;

use crate::auth::SessionAuthority;

pub const HOME_ROUTE: &str = "/";
pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
pub const TASKS_ROUTE: &str = "/tasks";

/// Upper bound on redirects followed by [`RouterGuard::navigate`].
pub const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Open,
    RequiresAuth,
    GuestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub name: &'static str,
    pub access: RouteAccess,
}

pub const ROUTES: &[Route] = &[
    Route { path: HOME_ROUTE, name: "home", access: RouteAccess::RequiresAuth },
    Route { path: LOGIN_ROUTE, name: "login", access: RouteAccess::GuestOnly },
    Route { path: REGISTER_ROUTE, name: "register", access: RouteAccess::Open },
    Route { path: TASKS_ROUTE, name: "tasks", access: RouteAccess::RequiresAuth },
];

/// Look up a route, ignoring any query string, fragment or trailing slash.
#[must_use]
pub fn find_route(path: &str) -> Option<&'static Route> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    let normalized = if trimmed.is_empty() { HOME_ROUTE } else { trimmed };
    ROUTES.iter().find(|r| r.path == normalized)
}

/// Access rule for `path`. Unknown paths are open.
#[must_use]
pub fn access_for(path: &str) -> RouteAccess {
    find_route(path).map_or(RouteAccess::Open, |r| r.access)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(&'static str),
}

#[must_use]
pub fn decide(access: RouteAccess, authenticated: bool) -> Navigation {
    match (access, authenticated) {
        (RouteAccess::RequiresAuth, false) => Navigation::Redirect(LOGIN_ROUTE),
        (RouteAccess::GuestOnly, true) => Navigation::Redirect(TASKS_ROUTE),
        _ => Navigation::Allow,
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Clone)]
pub struct RouterGuard {
    session: Arc<dyn SessionAuthority>,
}

impl RouterGuard {
    #[must_use]
    pub fn new(session: Arc<dyn SessionAuthority>) -> Self {
        Self { session }
    }

    /// Decide a single navigation to `path`.
    pub async fn before_each(&self, path: &str) -> Navigation {
        if !self.session.has_checked() {
            // Failure just means "not authenticated" for routing purposes.
            if let Err(e) = self.session.check_auth().await {
                tracing::debug!(error = %e, "initial session check failed");
            }
        }
        decide(access_for(path), self.session.is_authenticated())
    }

    /// Follow redirects from `path` and return where navigation ends up.
    pub async fn navigate(&self, path: &str) -> String {
        let mut current = path.to_owned();
        for _ in 0..MAX_REDIRECTS {
            match self.before_each(&current).await {
                Navigation::Allow => return current,
                Navigation::Redirect(to) => {
                    tracing::debug!(from = %current, %to, "navigation redirected");
                    to.clone_into(&mut current);
                }
            }
        }
        tracing::warn!(path, stopped_at = %current, "too many redirects");
        current
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
