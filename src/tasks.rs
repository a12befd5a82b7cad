//! Task list store.
//!
//! DESIGN
//! ======
//! Holds one page of tasks in server order plus the pagination cursor
//! derived from the last applied page. Mutations touch the local list only
//! after the backend accepted them: create appends, update replaces in
//! place, delete removes. Nothing re-sorts or re-paginates locally.
//!
//! The store does not check authentication; the router guard keeps
//! unauthenticated callers away from the views that use it.
//!
//! OVERLAPPING FETCHES
//! ===================
//! Each fetch takes a monotonic request id. Under
//! [`FetchOrdering::LastResponseWins`] every successful response is
//! applied, so the list reflects whichever response landed last. Under
//! [`FetchOrdering::LatestRequestWins`] a response is dropped when a newer
//! request's response has already been applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::Method;
use serde::Serialize;

use crate::config::FetchOrdering;
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::models::{CreateTask, PageLinks, PageMeta, Paginated, Task, UpdateTask};

pub const TASKS_PATH: &str = "/tasks";
pub const DEFAULT_PER_PAGE: u32 = 15;

// =============================================================================
// PAGINATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub per_page: u32,
    /// Grand total of items, when the backend reports it.
    pub total: Option<u64>,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { current_page: 1, total_pages: 1, per_page: DEFAULT_PER_PAGE, total: None, has_next: false, has_prev: false }
    }
}

impl Pagination {
    /// Cursor for a freshly fetched page.
    ///
    /// `total_pages` prefers `meta.last_page`, then `ceil(total / per_page)`.
    /// Without either it falls back to `ceil(to / per_page)`, which only
    /// counts the pages seen so far.
    #[must_use]
    pub fn from_page(meta: &PageMeta, links: &PageLinks) -> Self {
        let per_page = meta.per_page.max(1);
        let derived = meta
            .last_page
            .map(u64::from)
            .or_else(|| meta.total.map(|total| total.div_ceil(u64::from(per_page))))
            .or_else(|| meta.to.map(|to| to.div_ceil(u64::from(per_page))))
            .unwrap_or(0);
        let total_pages = u32::try_from(derived).unwrap_or(u32::MAX).max(meta.current_page).max(1);

        Self {
            current_page: meta.current_page,
            total_pages,
            per_page,
            total: meta.total,
            has_next: links.next.is_some(),
            has_prev: links.prev.is_some(),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskListSnapshot {
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub pagination: Pagination,
}

#[derive(Default)]
struct TaskState {
    tasks: Vec<Task>,
    pagination: Pagination,
    in_flight: usize,
    /// Request id of the most recently applied page.
    applied_request: u64,
}

pub struct TaskStore {
    client: ApiClient,
    ordering: FetchOrdering,
    state: Mutex<TaskState>,
    next_request: AtomicU64,
}

impl TaskStore {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let ordering = client.config().fetch_ordering;
        Self::with_ordering(client, ordering)
    }

    #[must_use]
    pub fn with_ordering(client: ApiClient, ordering: FetchOrdering) -> Self {
        Self { client, ordering, state: Mutex::new(TaskState::default()), next_request: AtomicU64::new(0) }
    }

    #[must_use]
    pub fn ordering(&self) -> FetchOrdering {
        self.ordering
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// True while at least one fetch is in flight.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    #[must_use]
    pub fn pagination(&self) -> Pagination {
        self.lock().pagination
    }

    #[must_use]
    pub fn snapshot(&self) -> TaskListSnapshot {
        let state = self.lock();
        TaskListSnapshot { tasks: state.tasks.clone(), loading: state.in_flight > 0, pagination: state.pagination }
    }

    /// Replace the list with page `page` and recompute the cursor.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; the list and cursor are left untouched.
    pub async fn fetch_tasks(&self, page: u32) -> Result<(), ApiError> {
        let request_id = self.next_request.fetch_add(1, Ordering::AcqRel) + 1;
        let _loading = LoadingGuard::enter(&self.state);

        let url = self.client.api_url(TASKS_PATH);
        let result = self
            .client
            .send_json::<Paginated<Task>>(self.client.get(&url, &[("page", page)]))
            .await;

        match result {
            Ok(body) => {
                self.apply_page(request_id, body);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, page, "error fetching tasks");
                Err(e)
            }
        }
    }

    /// Create a task and append the server's copy to the end of the list.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the list is left untouched.
    pub async fn create_task(&self, task: &CreateTask) -> Result<Task, ApiError> {
        let url = self.client.api_url(TASKS_PATH);
        let created: Task = self
            .client
            .send_resource(self.client.with_json(Method::POST, &url, task))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "error creating task"))?;

        self.lock().tasks.push(created.clone());
        Ok(created)
    }

    /// Update a task and replace the local copy in place. A task that is not
    /// in the local list is left alone.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the list is left untouched.
    pub async fn update_task(&self, id: u64, changes: &UpdateTask) -> Result<Task, ApiError> {
        let url = self.client.api_url(&format!("{TASKS_PATH}/{id}"));
        let updated: Task = self
            .client
            .send_resource(self.client.with_json(Method::PUT, &url, changes))
            .await
            .inspect_err(|e| tracing::error!(error = %e, task_id = id, "error updating task"))?;

        let mut state = self.lock();
        match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(slot) => *slot = updated.clone(),
            None => tracing::debug!(task_id = id, "updated task is not on the current page"),
        }
        Ok(updated)
    }

    /// Delete a task and drop it from the local list.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the list is left untouched.
    pub async fn delete_task(&self, id: u64) -> Result<(), ApiError> {
        let url = self.client.api_url(&format!("{TASKS_PATH}/{id}"));
        self.client
            .send_unit(self.client.request(Method::DELETE, &url))
            .await
            .inspect_err(|e| tracing::error!(error = %e, task_id = id, "error deleting task"))?;

        self.lock().tasks.retain(|t| t.id != id);
        Ok(())
    }

    fn apply_page(&self, request_id: u64, body: Paginated<Task>) {
        let mut state = self.lock();
        if self.ordering == FetchOrdering::LatestRequestWins && request_id < state.applied_request {
            tracing::debug!(request_id, applied = state.applied_request, "discarding stale task page");
            return;
        }
        state.pagination = Pagination::from_page(&body.meta, &body.links);
        state.tasks = body.data;
        state.applied_request = request_id;
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<TaskState>) -> MutexGuard<'_, TaskState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a fetch as in flight until dropped, including when the fetch
/// future itself is dropped mid-request.
struct LoadingGuard<'a> {
    state: &'a Mutex<TaskState>,
}

impl<'a> LoadingGuard<'a> {
    fn enter(state: &'a Mutex<TaskState>) -> Self {
        lock(state).in_flight += 1;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "tasks_test.rs"]
mod tests;
