//! Resource cache stores
//!
//! A [`ResourceStore`] owns the locally cached collection and pagination for
//! one record type and is the only thing that mutates them. Every action goes
//! through the shared [`Gateway`]; failures propagate to the caller and leave
//! the local state as it was.
//!
//! List endpoints answer in one of two shapes:
//! - `{"data": [...], "pagination": {...}}`: taken verbatim, the server total wins
//! - a bare array: the full result set, filtered locally with
//!   [`Resource::matches`] and `total` set to the filtered length

pub mod queues;
pub mod report;
pub mod services;

pub use queues::{QueueFilters, QueueSort};
pub use services::{ServiceFilters, ServiceSort};

use crate::api::{payload, Endpoints, Gateway};
use crate::error::ClientError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_PER_PAGE: u32 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Resource description
// ─────────────────────────────────────────────────────────────────────────────

/// A record type the backend serves as a CRUD collection
pub trait Resource: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Human-readable collection name for logs
    const NAME: &'static str;

    /// Create payload (the server assigns the id)
    type New: Serialize + Send + Sync;
    type Filters: Clone + Debug + Default + PartialEq + Send + Sync;
    type SortField: SortField<Self>;

    fn id(&self) -> i64;

    fn collection_url(endpoints: &Endpoints) -> String;

    fn item_url(endpoints: &Endpoints, id: i64) -> String;

    /// Filters as list-endpoint query parameters
    fn filter_params(filters: &Self::Filters) -> Vec<(String, String)>;

    /// Local predicate applied when the server returns the unfiltered set
    fn matches(&self, filters: &Self::Filters) -> bool;

    /// Body sent on update
    fn to_update_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn default_sorting() -> Sorting<Self::SortField> {
        Sorting::default()
    }
}

/// Typed accessor for one sortable field
pub trait SortField<R>: Copy + Debug + PartialEq + Send + Sync + 'static {
    fn key(&self, record: &R) -> SortKey;

    fn name(&self) -> &'static str;

    fn parse(name: &str) -> Option<Self>;
}

/// Comparable value pulled out of a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Int(i64),
    Text(String),
}

impl From<i64> for SortKey {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SortKey {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

/// Local sort applied to the visible page. Both parts must be set for any
/// sorting to happen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sorting<F> {
    pub sort_by: Option<F>,
    pub direction: Option<SortDirection>,
}

impl<F> Default for Sorting<F> {
    fn default() -> Self {
        Self {
            sort_by: None,
            direction: None,
        }
    }
}

impl<F> Sorting<F> {
    pub fn new(sort_by: F, direction: SortDirection) -> Self {
        Self {
            sort_by: Some(sort_by),
            direction: Some(direction),
        }
    }

    pub fn is_active(&self) -> bool {
        self.sort_by.is_some() && self.direction.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    #[serde(alias = "perPage")]
    pub per_page: u32,
    pub total: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            total: 0,
        }
    }
}

impl Pagination {
    /// Page and per-page are at least 1
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.max(1),
            total: self.total,
        }
    }

    fn query(&self) -> [(String, String); 2] {
        [
            ("page".to_string(), self.page.to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
        ]
    }
}

/// Whether a `get_all` response replaced the local collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer request had already been applied; this response was dropped
    Stale,
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

struct StoreState<R> {
    items: Vec<R>,
    pagination: Pagination,
    /// Sequence number of the last applied `get_all`
    applied_seq: u64,
}

pub struct ResourceStore<R: Resource> {
    gateway: Gateway,
    state: Mutex<StoreState<R>>,
    next_seq: AtomicU64,
}

impl<R: Resource> ResourceStore<R> {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            state: Mutex::new(StoreState {
                items: Vec::new(),
                pagination: Pagination::default(),
                applied_seq: 0,
            }),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Snapshot of the local collection
    pub fn items(&self) -> Vec<R> {
        self.lock().items.clone()
    }

    /// Borrow the local collection without cloning it
    pub fn with_items<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        f(&self.lock().items)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pagination(&self) -> Pagination {
        self.lock().pagination
    }

    /// Replace the collection and pagination with the server's answer.
    /// Responses that resolve after a newer request's response are discarded.
    pub async fn get_all(
        &self,
        filters: &R::Filters,
        sorting: &Sorting<R::SortField>,
        pagination: &Pagination,
    ) -> Result<FetchOutcome, ClientError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let requested = pagination.normalized();

        let mut params = R::filter_params(filters);
        if let Some(field) = sorting.sort_by {
            params.push(("sort_by".to_string(), field.name().to_string()));
        }
        if let Some(direction) = sorting.direction {
            params.push(("sorting_order".to_string(), direction.as_str().to_string()));
        }
        params.extend(requested.query());

        let base = R::collection_url(self.gateway.endpoints());
        let url = reqwest::Url::parse_with_params(&base, &params)
            .map_err(|e| ClientError::Transport(format!("Invalid URL {}: {}", base, e)))?;

        let body = self.gateway.get(url.as_str()).await?.into_result()?;
        let (items, pagination) = parse_list::<R>(body, filters, requested)?;

        let mut state = self.lock();
        if seq < state.applied_seq {
            tracing::debug!(
                resource = R::NAME,
                seq,
                applied = state.applied_seq,
                "Discarding stale list response"
            );
            return Ok(FetchOutcome::Stale);
        }

        state.items = dedupe(items);
        state.pagination = pagination;
        state.applied_seq = seq;
        tracing::debug!(
            resource = R::NAME,
            count = state.items.len(),
            total = pagination.total,
            "Collection replaced"
        );
        Ok(FetchOutcome::Applied)
    }

    /// Single record from the server. The collection is not touched.
    pub async fn fetch_one(&self, id: i64) -> Result<R, ClientError> {
        let url = R::item_url(self.gateway.endpoints(), id);
        let body = self.gateway.get(&url).await?.into_result()?;
        single_record(body)
    }

    /// Create on the server, then prepend the server's record locally
    pub async fn add(&self, record: &R::New) -> Result<R, ClientError> {
        let url = R::collection_url(self.gateway.endpoints());
        let body = self
            .gateway
            .send_json(Method::POST, &url, record)
            .await?
            .into_result()?;
        let created: R = single_record(body)?;

        let mut state = self.lock();
        match position(&state.items, created.id()) {
            Some(index) => {
                tracing::debug!(resource = R::NAME, id = created.id(), "Created id already cached, replacing");
                state.items[index] = created.clone();
            }
            None => state.items.insert(0, created.clone()),
        }
        Ok(created)
    }

    /// Update on the server, then replace the local record with the same id
    pub async fn update(&self, record: &R) -> Result<R, ClientError> {
        let url = R::item_url(self.gateway.endpoints(), record.id());
        let body = record.to_update_body()?;
        let body = self
            .gateway
            .send_json(Method::PUT, &url, &body)
            .await?
            .into_result()?;
        let updated: R = single_record(body)?;

        let mut state = self.lock();
        match position(&state.items, record.id()) {
            Some(index) => {
                state.items[index] = updated.clone();
                // The server may have moved the record onto an id cached
                // elsewhere; the fresh record wins and keeps this position
                if updated.id() != record.id() {
                    let mut current = 0;
                    state.items.retain(|r| {
                        let keep = current == index || r.id() != updated.id();
                        current += 1;
                        keep
                    });
                }
            }
            None => {
                tracing::debug!(resource = R::NAME, id = record.id(), "Updated record not cached, collection unchanged");
            }
        }
        Ok(updated)
    }

    /// Delete on the server. The local record is dropped only on a truthy
    /// acknowledgement; returns whether that happened.
    pub async fn remove(&self, record: &R) -> Result<bool, ClientError> {
        let url = R::item_url(self.gateway.endpoints(), record.id());
        let body = self.gateway.delete(&url).await?.into_result()?;

        if !payload::is_truthy(&body) {
            tracing::debug!(resource = R::NAME, id = record.id(), "Delete not acknowledged, keeping record");
            return Ok(false);
        }

        let mut state = self.lock();
        if let Some(index) = position(&state.items, record.id()) {
            state.items.remove(index);
        }
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, StoreState<R>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn position<R: Resource>(items: &[R], id: i64) -> Option<usize> {
    items.iter().position(|r| r.id() == id)
}

/// Keep the first record for each id
fn dedupe<R: Resource>(items: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|r| seen.insert(r.id())).collect()
}

/// Create/update responses are usually the record, sometimes a one-element array
fn single_record<R: Resource>(body: Value) -> Result<R, ClientError> {
    let value = match body {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => {
            return Err(ClientError::Transport(format!(
                "Empty response for {}",
                R::NAME
            )))
        }
        other => other,
    };
    serde_json::from_value(value).map_err(ClientError::from)
}

fn parse_list<R: Resource>(
    body: Value,
    filters: &R::Filters,
    requested: Pagination,
) -> Result<(Vec<R>, Pagination), ClientError> {
    match body {
        Value::Array(_) => {
            let all: Vec<R> = serde_json::from_value(body)?;
            let data: Vec<R> = all.into_iter().filter(|r| r.matches(filters)).collect();
            let pagination = Pagination {
                total: data.len() as u64,
                ..requested
            };
            Ok((data, pagination))
        }
        Value::Object(mut map) if map.contains_key("data") => {
            let data: Vec<R> = serde_json::from_value(map.remove("data").unwrap_or(Value::Null))?;
            let pagination = match map.remove("pagination") {
                Some(p) => serde_json::from_value::<Pagination>(p)?.normalized(),
                None => Pagination {
                    total: data.len() as u64,
                    ..requested
                },
            };
            Ok((data, pagination))
        }
        other => Err(ClientError::Transport(format!(
            "Unexpected {} list response: {}",
            R::NAME,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
