//! Client for a Laravel/Sanctum task-management backend.
//!
//! DESIGN
//! ======
//! Everything funnels through one [`http::ApiClient`]: a reqwest client with
//! a cookie jar for the backend session, an interceptor that mirrors the
//! `XSRF-TOKEN` cookie into `X-XSRF-TOKEN`, and an optional bearer token
//! read from a [`token::TokenStore`].
//!
//! On top of the client sit two stores and a guard:
//! - [`auth::AuthStore`] owns the session (`check_auth`, `login`, `register`, `logout`)
//! - [`tasks::TaskStore`] owns one page of tasks and the pagination cursor
//! - [`router::RouterGuard`] decides navigation from the session state
//!
//! [`app::AppContext`] wires them together. There is no global state.

pub mod app;
pub mod auth;
pub mod config;
pub mod csrf;
pub mod error;
pub mod http;
pub mod models;
pub mod router;
pub mod tasks;
pub mod token;

#[cfg(test)]
mod test_support;

pub use app::AppContext;
pub use auth::{AuthStore, Session, SessionAuthority};
pub use config::{ClientConfig, FetchOrdering};
pub use error::ApiError;
pub use http::ApiClient;
pub use models::{CreateTask, Task, TaskStatus, UpdateTask, User};
pub use router::{Navigation, RouteAccess, RouterGuard};
pub use tasks::{Pagination, TaskStore};
pub use token::{FileTokenStore, MemoryTokenStore, TokenStore};
