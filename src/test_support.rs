//! In-process mock of the Laravel/Sanctum task backend.
//!
//! Binds `127.0.0.1:0`, records every request it sees, and can be told to
//! fail individual endpoints or delay individual pages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{AUTHORIZATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::http::ApiClient;
use crate::models::{Task, TaskStatus, User};
use crate::token::{MemoryTokenStore, TokenStore};

pub(crate) const XSRF_RAW: &str = "tok%3D%3D";
pub(crate) const XSRF_DECODED: &str = "tok==";
pub(crate) const SESSION_COOKIE: &str = "laravel_session";
pub(crate) const EMAIL: &str = "ada@example.test";
pub(crate) const PASSWORD: &str = "secret-password";
pub(crate) const VALID_BEARER: &str = "bearer-123";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Endpoint {
    Csrf,
    Login,
    Register,
    Logout,
    User,
    TasksIndex,
    TasksStore,
    TasksUpdate,
    TasksDestroy,
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub xsrf: Option<String>,
    pub requested_with: Option<String>,
    pub content_type: Option<String>,
}

pub(crate) struct MockState {
    pub users: Vec<User>,
    pub tasks: Vec<Task>,
    pub per_page: usize,
    pub next_id: u64,
    pub failing: HashMap<Endpoint, StatusCode>,
    pub page_delays: HashMap<u32, Duration>,
    /// Include `total`/`last_page` in page meta.
    pub length_aware: bool,
    /// Wrap single resources in `{ "data": ... }`.
    pub wrap_resources: bool,
    /// Answer `GET /api/user` with 200 and an empty body.
    pub empty_user_body: bool,
    pub registered: Vec<Value>,
    pub requests: Vec<Recorded>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            users: vec![sample_user(1, "Ada", EMAIL)],
            tasks: Vec::new(),
            per_page: 15,
            next_id: 1,
            failing: HashMap::new(),
            page_delays: HashMap::new(),
            length_aware: true,
            wrap_resources: false,
            empty_user_body: false,
            registered: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl MockState {
    /// Append `count` tasks owned by the first user.
    pub fn seed_tasks(&mut self, count: usize) {
        let owner = self.users[0].clone();
        for _ in 0..count {
            let id = self.next_id;
            self.next_id += 1;
            self.tasks.push(sample_task(id, &owner, &format!("Task {id}"), TaskStatus::Pending));
        }
    }
}

pub(crate) fn sample_user(id: u64, name: &str, email: &str) -> User {
    User {
        id,
        name: name.to_owned(),
        email: email.to_owned(),
        email_verified_at: None,
        created_at: Some("2024-04-01T10:00:00.000000Z".to_owned()),
        updated_at: Some("2024-04-01T10:00:00.000000Z".to_owned()),
    }
}

pub(crate) fn sample_task(id: u64, owner: &User, title: &str, status: TaskStatus) -> Task {
    Task {
        id,
        title: title.to_owned(),
        description: format!("Description for {title}"),
        status,
        user_id: owner.id,
        created_at: "2024-05-01T10:00:00.000000Z".to_owned(),
        updated_at: "2024-05-01T10:00:00.000000Z".to_owned(),
        user: Some(owner.clone()),
    }
}

// =============================================================================
// BACKEND HANDLE
// =============================================================================

type Shared = Arc<Mutex<MockState>>;

pub(crate) struct MockBackend {
    pub url: String,
    state: Shared,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with(MockState::default()).await
    }

    pub async fn start_with(state: MockState) -> Self {
        let shared = Arc::new(Mutex::new(state));
        let app = router(Arc::clone(&shared));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock backend should bind");
        let addr = listener.local_addr().expect("mock backend should have an address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { url: format!("http://{addr}"), state: shared }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.url).expect("mock url should be a valid origin")
    }

    pub fn client(&self) -> ApiClient {
        self.client_with_tokens(Arc::new(MemoryTokenStore::new()))
    }

    pub fn client_with_tokens(&self, tokens: Arc<dyn TokenStore>) -> ApiClient {
        ApiClient::new(self.config(), tokens).expect("client should build")
    }

    pub fn fail(&self, endpoint: Endpoint, status: StatusCode) {
        self.state().failing.insert(endpoint, status);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state().failing.remove(&endpoint);
    }

    /// Requests seen for `method` + `path`, in arrival order.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    /// `METHOD path` of every request, in arrival order.
    pub fn request_log(&self) -> Vec<String> {
        self.state()
            .requests
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

fn lock(shared: &Shared) -> MutexGuard<'_, MockState> {
    shared.lock().expect("mock state should lock")
}

// =============================================================================
// ROUTES
// =============================================================================

fn router(shared: Shared) -> Router {
    Router::new()
        .route("/sanctum/csrf-cookie", get(csrf_cookie))
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/api/user", get(current_user))
        .route("/api/tasks", get(list_tasks).post(store_task))
        .route("/api/tasks/{id}", put(update_task).delete(destroy_task))
        .layer(middleware::from_fn_with_state(Arc::clone(&shared), record))
        .with_state(shared)
}

async fn record(State(shared): State<Shared>, request: Request, next: Next) -> Response {
    let recorded = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned)
        };
        Recorded {
            method: request.method().to_string(),
            path: request.uri().path().to_owned(),
            query: request.uri().query().map(ToOwned::to_owned),
            authorization: header("authorization"),
            xsrf: header("x-xsrf-token"),
            requested_with: header("x-requested-with"),
            content_type: header("content-type"),
        }
    };
    lock(&shared).requests.push(recorded);
    next.run(request).await
}

fn forced_failure(shared: &Shared, endpoint: Endpoint) -> Option<Response> {
    let status = lock(shared).failing.get(&endpoint).copied()?;
    Some((status, Json(json!({ "message": "forced failure" }))).into_response())
}

fn csrf_mismatch() -> Response {
    (StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN), Json(json!({ "message": "CSRF token mismatch." })))
        .into_response()
}

fn unauthenticated() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Unauthenticated." }))).into_response()
}

fn validation(field: &str, message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": message, "errors": { field: [message] } })),
    )
        .into_response()
}

fn has_session(jar: &CookieJar) -> bool {
    jar.get(SESSION_COOKIE).is_some()
}

fn csrf_ok(headers: &HeaderMap) -> bool {
    headers.get("x-xsrf-token").and_then(|v| v.to_str().ok()) == Some(XSRF_DECODED)
}

/// Session cookie first, bearer token as fallback.
fn authenticated_user(shared: &Shared, jar: &CookieJar, headers: &HeaderMap) -> Option<User> {
    let state = lock(shared);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().strip_prefix("session-")?.parse::<u64>().ok()?;
        return state.users.iter().find(|u| u.id == id).cloned();
    }
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(VALID_BEARER) {
        return state.users.first().cloned();
    }
    None
}

fn resource(task: &Task, wrap: bool) -> Value {
    let value = json!(task);
    if wrap { json!({ "data": value }) } else { value }
}

async fn csrf_cookie(State(shared): State<Shared>) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::Csrf) {
        return resp;
    }
    (StatusCode::NO_CONTENT, [(SET_COOKIE, format!("XSRF-TOKEN={XSRF_RAW}; Path=/"))]).into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(shared): State<Shared>, headers: HeaderMap, jar: CookieJar, Json(body): Json<LoginBody>) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::Login) {
        return resp;
    }
    if !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    let user = lock(&shared).users.iter().find(|u| u.email == body.email).cloned();
    match user {
        Some(user) if body.password == PASSWORD => {
            let cookie = Cookie::build((SESSION_COOKIE, format!("session-{}", user.id)))
                .path("/")
                .http_only(true);
            (jar.add(cookie), StatusCode::NO_CONTENT).into_response()
        }
        _ => validation("email", "These credentials do not match our records."),
    }
}

async fn register(State(shared): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::Register) {
        return resp;
    }
    if !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    let password = body.get("password").and_then(Value::as_str);
    let confirmation = body.get("password_confirmation").and_then(Value::as_str);
    if password.is_none() || password != confirmation {
        return validation("password", "The password field confirmation does not match.");
    }
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_owned();
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default().to_owned();

    let mut state = lock(&shared);
    if state.users.iter().any(|u| u.email == email) {
        return validation("email", "The email has already been taken.");
    }
    let id = state.users.len() as u64 + 1;
    state.users.push(sample_user(id, &name, &email));
    state.registered.push(body);
    StatusCode::CREATED.into_response()
}

async fn logout(State(shared): State<Shared>, headers: HeaderMap, jar: CookieJar) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::Logout) {
        return resp;
    }
    if has_session(&jar) && !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    (jar.remove(Cookie::from(SESSION_COOKIE)), StatusCode::NO_CONTENT).into_response()
}

async fn current_user(State(shared): State<Shared>, headers: HeaderMap, jar: CookieJar) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::User) {
        return resp;
    }
    if lock(&shared).empty_user_body {
        return StatusCode::OK.into_response();
    }
    match authenticated_user(&shared, &jar, &headers) {
        Some(user) => Json(user).into_response(),
        None => unauthenticated(),
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

async fn list_tasks(
    State(shared): State<Shared>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::TasksIndex) {
        return resp;
    }
    if authenticated_user(&shared, &jar, &headers).is_none() {
        return unauthenticated();
    }
    let page = query.page.unwrap_or(1).max(1);
    let delay = lock(&shared).page_delays.get(&page).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let body = page_body(&lock(&shared), page);
    Json(body).into_response()
}

fn page_body(state: &MockState, page: u32) -> Value {
    let base = "http://mock.test/api/tasks";
    let per_page = state.per_page.max(1);
    let start = (page as usize - 1) * per_page;
    let items: Vec<&Task> = state.tasks.iter().skip(start).take(per_page).collect();
    let total = state.tasks.len();
    let last_page = total.div_ceil(per_page).max(1);

    let (from, to) = if items.is_empty() {
        (Value::Null, Value::Null)
    } else {
        (json!(start + 1), json!(start + items.len()))
    };
    let mut meta = json!({
        "current_page": page,
        "from": from,
        "path": base,
        "per_page": per_page,
        "to": to,
    });
    if state.length_aware {
        meta["total"] = json!(total);
        meta["last_page"] = json!(last_page);
    }
    let page_link = |n: usize| json!(format!("{base}?page={n}"));
    let current = page as usize;
    json!({
        "data": items,
        "links": {
            "first": page_link(1),
            "last": if state.length_aware { page_link(last_page) } else { Value::Null },
            "prev": if current > 1 { page_link(current - 1) } else { Value::Null },
            "next": if current < last_page { page_link(current + 1) } else { Value::Null },
        },
        "meta": meta,
    })
}

#[derive(Deserialize)]
struct TaskBody {
    title: Option<String>,
    description: Option<String>,
    status: Option<TaskStatus>,
}

async fn store_task(
    State(shared): State<Shared>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<TaskBody>,
) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::TasksStore) {
        return resp;
    }
    if has_session(&jar) && !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    let Some(owner) = authenticated_user(&shared, &jar, &headers) else {
        return unauthenticated();
    };
    let Some(title) = body.title.filter(|t| !t.is_empty()) else {
        return validation("title", "The title field is required.");
    };

    let mut state = lock(&shared);
    let id = state.next_id;
    state.next_id += 1;
    let mut task = sample_task(id, &owner, &title, body.status.unwrap_or(TaskStatus::Pending));
    task.description = body.description.unwrap_or_default();
    state.tasks.push(task.clone());
    let wrap = state.wrap_resources;
    drop(state);

    (StatusCode::CREATED, Json(resource(&task, wrap))).into_response()
}

async fn update_task(
    State(shared): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<TaskBody>,
) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::TasksUpdate) {
        return resp;
    }
    if has_session(&jar) && !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    if authenticated_user(&shared, &jar, &headers).is_none() {
        return unauthenticated();
    }

    let mut state = lock(&shared);
    let wrap = state.wrap_resources;
    let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "No query results for model [Task]." })))
            .into_response();
    };
    if let Some(title) = body.title {
        task.title = title;
    }
    if let Some(description) = body.description {
        task.description = description;
    }
    if let Some(status) = body.status {
        task.status = status;
    }
    task.updated_at = "2024-06-01T00:00:00.000000Z".to_owned();
    let updated = task.clone();
    drop(state);

    Json(resource(&updated, wrap)).into_response()
}

async fn destroy_task(
    State(shared): State<Shared>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if let Some(resp) = forced_failure(&shared, Endpoint::TasksDestroy) {
        return resp;
    }
    if has_session(&jar) && !csrf_ok(&headers) {
        return csrf_mismatch();
    }
    if authenticated_user(&shared, &jar, &headers).is_none() {
        return unauthenticated();
    }
    let mut state = lock(&shared);
    let before = state.tasks.len();
    state.tasks.retain(|t| t.id != id);
    if state.tasks.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}
