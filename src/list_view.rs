//! List view over a resource store
//!
//! Holds the filters, sorting and pagination a caller is looking at and
//! derives the visible page from the store's collection on demand. Nothing
//! here mutates the store's collection directly; mutations go through the
//! store and their errors land in the view's error slot instead of being
//! returned.

use crate::error::ClientError;
use crate::resources::{
    FetchOutcome, Pagination, Resource, ResourceStore, SortDirection, SortField, Sorting,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Initial view state. Every part defaults per resource.
pub struct ListOptions<R: Resource> {
    pub filters: R::Filters,
    pub sorting: Sorting<R::SortField>,
    pub pagination: Pagination,
    /// Skip the initial fetch
    pub lazy: bool,
}

impl<R: Resource> Default for ListOptions<R> {
    fn default() -> Self {
        Self {
            filters: R::Filters::default(),
            sorting: R::default_sorting(),
            pagination: Pagination::default(),
            lazy: false,
        }
    }
}

struct ViewState<R: Resource> {
    filters: R::Filters,
    sorting: Sorting<R::SortField>,
    pagination: Pagination,
    error: Option<ClientError>,
}

pub struct ListView<R: Resource> {
    store: Arc<ResourceStore<R>>,
    state: Mutex<ViewState<R>>,
    in_flight: AtomicUsize,
}

impl<R: Resource> ListView<R> {
    /// Build the view without touching the network
    pub fn new(store: Arc<ResourceStore<R>>, options: ListOptions<R>) -> Self {
        Self {
            store,
            state: Mutex::new(ViewState {
                filters: options.filters,
                sorting: options.sorting,
                pagination: options.pagination.normalized(),
                error: None,
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Build the view and run the initial fetch unless `lazy` is set.
    /// An initial fetch failure is kept in the error slot.
    pub async fn open(store: Arc<ResourceStore<R>>, options: ListOptions<R>) -> Self {
        let lazy = options.lazy;
        let view = Self::new(store, options);
        if !lazy {
            if let Err(e) = view.fetch().await {
                tracing::warn!(resource = R::NAME, "Initial fetch failed: {}", e);
                view.lock().error = Some(e);
            }
        }
        view
    }

    pub fn pagination(&self) -> Pagination {
        self.lock().pagination
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Last captured mutation or initial-fetch error
    pub fn error(&self) -> Option<ClientError> {
        self.lock().error.clone()
    }

    pub fn take_error(&self) -> Option<ClientError> {
        self.lock().error.take()
    }

    /// Refresh the store with the current descriptor. Errors propagate.
    pub async fn fetch(&self) -> Result<(), ClientError> {
        let _loading = Loading::start(&self.in_flight);
        let (filters, sorting, pagination) = {
            let state = self.lock();
            (state.filters.clone(), state.sorting, state.pagination)
        };

        let outcome = self.store.get_all(&filters, &sorting, &pagination).await?;
        if outcome == FetchOutcome::Applied {
            self.lock().pagination = self.store.pagination();
        }
        Ok(())
    }

    /// Change filters. A real change resets to page 1 and refetches.
    pub async fn set_filters(&self, filters: R::Filters) -> Result<(), ClientError> {
        {
            let mut state = self.lock();
            if state.filters == filters {
                return Ok(());
            }
            state.filters = filters;
            state.pagination.page = 1;
        }
        self.fetch().await
    }

    pub fn set_page(&self, page: u32) {
        self.lock().pagination.page = page.max(1);
    }

    pub fn set_per_page(&self, per_page: u32) {
        self.lock().pagination.per_page = per_page.max(1);
    }

    pub fn set_sorting(&self, sorting: Sorting<R::SortField>) {
        self.lock().sorting = sorting;
    }

    /// Current page of the cached collection, sorted within the page
    pub fn visible(&self) -> Vec<R> {
        let (sorting, pagination) = {
            let state = self.lock();
            (state.sorting, state.pagination)
        };
        self.store.with_items(|items| {
            let mut page = page_slice(items, pagination.page, pagination.per_page).to_vec();
            sort_stable(&mut page, &sorting);
            page
        })
    }

    pub async fn add(&self, record: &R::New) -> Option<R> {
        let _loading = Loading::start(&self.in_flight);
        let result = self.store.add(record).await;
        self.capture(result)
    }

    pub async fn update(&self, record: &R) -> Option<R> {
        let _loading = Loading::start(&self.in_flight);
        let result = self.store.update(record).await;
        self.capture(result)
    }

    /// `Some(false)` when the server didn't acknowledge the delete
    pub async fn remove(&self, record: &R) -> Option<bool> {
        let _loading = Loading::start(&self.in_flight);
        let result = self.store.remove(record).await;
        self.capture(result)
    }

    fn capture<T>(&self, result: Result<T, ClientError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(resource = R::NAME, "Mutation failed: {}", e);
                self.lock().error = Some(e);
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState<R>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Counts an in-flight operation until dropped
struct Loading<'a>(&'a AtomicUsize);

impl<'a> Loading<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `items[(page-1)*per_page .. page*per_page]`, clamped to the collection
pub fn page_slice<T>(items: &[T], page: u32, per_page: u32) -> &[T] {
    let per_page = per_page.max(1) as usize;
    let start = (page.max(1) as usize - 1).saturating_mul(per_page);
    let end = start.saturating_add(per_page).min(items.len());
    if start >= items.len() {
        return &[];
    }
    &items[start..end]
}

/// Stable sort by the chosen field. No-op unless field and direction are both set.
pub fn sort_stable<R, F: SortField<R>>(items: &mut [R], sorting: &Sorting<F>) {
    let (Some(field), Some(direction)) = (sorting.sort_by, sorting.direction) else {
        return;
    };
    items.sort_by(|a, b| {
        let ord = field.key(a).cmp(&field.key(b));
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{gateway, FakeTransport};
    use crate::models::{NewService, Service};
    use crate::resources::{ServiceFilters, ServiceSort};
    use serde_json::{json, Value};

    fn services(n: i64) -> Value {
        Value::Array(
            (1..=n)
                .map(|id| json!({"id": id, "name": format!("Desk {:02}", id)}))
                .collect(),
        )
    }

    fn store(transport: &Arc<FakeTransport>) -> Arc<ResourceStore<Service>> {
        Arc::new(ResourceStore::new(gateway(transport.clone())))
    }

    fn names(items: &[Service]) -> Vec<String> {
        items.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_page_slice_length() {
        let items: Vec<u32> = (0..23).collect();
        for n in [0usize, 1, 9, 10, 11, 23] {
            for p in [1u32, 3, 10] {
                for k in [1u32, 2, 3, 9] {
                    let expected = (p as usize).min(n.saturating_sub((k as usize - 1) * p as usize));
                    assert_eq!(
                        page_slice(&items[..n], k, p).len(),
                        expected,
                        "n={} p={} k={}",
                        n,
                        p,
                        k
                    );
                }
            }
        }
    }

    #[test]
    fn test_page_slice_page_zero_is_first_page() {
        let items = [1, 2, 3];
        assert_eq!(page_slice(&items, 0, 2), &[1, 2]);
    }

    fn tagged(pairs: &[(i64, &str)]) -> Vec<Service> {
        pairs
            .iter()
            .map(|(avg, name)| {
                serde_json::from_value(json!({"id": avg * 10, "name": name, "avg_minute": avg}))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_sort_is_stable_ascending() {
        let mut items = tagged(&[(2, "a"), (1, "b"), (2, "c"), (1, "d")]);
        sort_stable(&mut items, &Sorting::new(ServiceSort::AvgMinute, SortDirection::Ascending));
        assert_eq!(names(&items), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_sort_is_stable_descending() {
        let mut items = tagged(&[(2, "a"), (1, "b"), (2, "c"), (1, "d")]);
        sort_stable(&mut items, &Sorting::new(ServiceSort::AvgMinute, SortDirection::Descending));
        assert_eq!(names(&items), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_sort_needs_both_field_and_direction() {
        let mut items = tagged(&[(2, "a"), (1, "b")]);
        let half = Sorting {
            sort_by: Some(ServiceSort::AvgMinute),
            direction: None,
        };
        sort_stable(&mut items, &half);
        assert_eq!(names(&items), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_open_fetches_unless_lazy() {
        let transport = FakeTransport::new();
        transport.push(200, services(3));

        let view = ListView::open(store(&transport), ListOptions::default()).await;
        assert_eq!(view.visible().len(), 3);
        assert_eq!(view.pagination().total, 3);
        assert_eq!(transport.requests().len(), 1);

        let lazy = ListView::open(
            store(&transport),
            ListOptions {
                lazy: true,
                ..Default::default()
            },
        )
        .await;
        assert!(lazy.visible().is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_open_keeps_initial_failure_in_error_slot() {
        let transport = FakeTransport::new();
        transport.push_error(ClientError::transport("connection refused"));

        let view = ListView::open(store(&transport), ListOptions::default()).await;

        assert!(matches!(view.error(), Some(ClientError::Transport(_))));
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_visible_slices_then_sorts_within_page() {
        let transport = FakeTransport::new();
        transport.push(200, services(25));
        let view = ListView::open(store(&transport), ListOptions::default()).await;

        view.set_page(2);
        view.set_sorting(Sorting::new(ServiceSort::Name, SortDirection::Descending));

        let page = view.visible();
        assert_eq!(page.len(), 10);
        assert_eq!(page.first().unwrap().name, "Desk 20");
        assert_eq!(page.last().unwrap().name, "Desk 11");

        view.set_page(3);
        assert_eq!(view.visible().len(), 5);
    }

    #[tokio::test]
    async fn test_filter_change_resets_page_and_refetches() {
        let transport = FakeTransport::new();
        transport.push(200, services(25));
        let view = ListView::open(store(&transport), ListOptions::default()).await;
        view.set_page(3);

        transport.push(200, services(25));
        view.set_filters(ServiceFilters {
            search: "desk 1".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(view.pagination().page, 1);
        assert_eq!(transport.requests().len(), 2);
        assert!(transport.last().url.contains("page=1"));
        // Desk 10..19
        assert_eq!(view.pagination().total, 10);

        // Same filters again: nothing to do
        view.set_filters(ServiceFilters {
            search: "desk 1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_propagates_error() {
        let transport = FakeTransport::new();
        let view = ListView::new(store(&transport), ListOptions::default());

        transport.push(500, json!({"detail": "boom"}));
        let err = view.fetch().await.unwrap_err();

        assert_eq!(err.message(), "boom");
        assert!(!view.is_loading());
    }

    #[tokio::test]
    async fn test_mutation_error_is_captured_not_returned() {
        let transport = FakeTransport::new();
        transport.push(200, services(2));
        let view = ListView::open(store(&transport), ListOptions::default()).await;

        transport.push(200, json!({"error": "Name is required"}));
        let created = view
            .add(&NewService {
                name: String::new(),
                description: String::new(),
                available_days: String::new(),
                room: String::new(),
                from_time: String::new(),
                to_time: String::new(),
                avg_minute: 0,
            })
            .await;

        assert!(created.is_none());
        assert!(!view.is_loading());
        assert_eq!(
            view.take_error(),
            Some(ClientError::Validation("Name is required".into()))
        );
        assert!(view.error().is_none());
        assert_eq!(view.visible().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_passthrough() {
        let transport = FakeTransport::new();
        transport.push(200, services(2));
        let view = ListView::open(store(&transport), ListOptions::default()).await;
        let first = view.visible()[0].clone();

        transport.push(200, json!({"deleted": true}));
        assert_eq!(view.remove(&first).await, Some(true));
        assert_eq!(view.visible().len(), 1);
        assert!(view.error().is_none());
    }
}
