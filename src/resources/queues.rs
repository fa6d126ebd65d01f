// Queue tickets: collection resource plus the desk operations around it

use super::{Resource, ResourceStore, SortField, SortKey, Sorting};
use crate::api::Endpoints;
use crate::error::ClientError;
use crate::models::{AvailableNumber, NewQueue, Queue, Waitlist};
use reqwest::Method;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct QueueFilters {
    /// true: unfinished tickets only, false: finished tickets only
    pub is_active: bool,
    pub search: String,
}

impl Default for QueueFilters {
    fn default() -> Self {
        Self {
            is_active: true,
            search: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSort {
    Id,
    Number,
    Time,
    Step,
    CreatedAt,
    Client,
    Service,
}

impl SortField<Queue> for QueueSort {
    fn key(&self, record: &Queue) -> SortKey {
        match self {
            Self::Id => record.id.into(),
            Self::Number => record.number.into(),
            Self::Time => record.time.as_str().into(),
            Self::Step => i64::from(record.step).into(),
            Self::CreatedAt => record.created_at.as_str().into(),
            Self::Client => record.client_name().into(),
            Self::Service => record.service_name().into(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Number => "number",
            Self::Time => "time",
            Self::Step => "step",
            Self::CreatedAt => "created_at",
            Self::Client => "client",
            Self::Service => "service",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "number" => Self::Number,
            "time" => Self::Time,
            "step" => Self::Step,
            "created_at" => Self::CreatedAt,
            "client" => Self::Client,
            "service" => Self::Service,
            _ => return None,
        })
    }
}

impl Resource for Queue {
    const NAME: &'static str = "queue";

    type New = NewQueue;
    type Filters = QueueFilters;
    type SortField = QueueSort;

    fn id(&self) -> i64 {
        self.id
    }

    fn collection_url(endpoints: &Endpoints) -> String {
        endpoints.queues()
    }

    fn item_url(endpoints: &Endpoints, id: i64) -> String {
        endpoints.queue(id)
    }

    fn filter_params(filters: &QueueFilters) -> Vec<(String, String)> {
        let mut params = vec![("is_active".to_string(), filters.is_active.to_string())];
        if !filters.search.is_empty() {
            params.push(("search".to_string(), filters.search.clone()));
        }
        params
    }

    fn matches(&self, filters: &QueueFilters) -> bool {
        if self.is_active() != filters.is_active {
            return false;
        }
        if filters.search.is_empty() {
            return true;
        }
        let needle = filters.search.to_lowercase();
        self.client_name().to_lowercase().contains(&needle)
            || self.service_name().to_lowercase().contains(&needle)
            || self.number.to_string().contains(&needle)
    }

    fn to_update_body(&self) -> Result<Value, serde_json::Error> {
        Queue::to_update_body(self)
    }

    fn default_sorting() -> Sorting<QueueSort> {
        Sorting {
            sort_by: Some(QueueSort::Number),
            direction: None,
        }
    }
}

// Desk operations. These don't touch the cached collection.
impl ResourceStore<Queue> {
    /// Tickets currently waiting and currently being served
    pub async fn waitlist(&self) -> Result<Waitlist, ClientError> {
        let body = self
            .gateway()
            .get(&self.gateway().endpoints().waitlist())
            .await?
            .into_result()?;
        Ok(serde_json::from_value(body)?)
    }

    /// Free ticket numbers for a service on a date (YYYY-MM-DD)
    pub async fn available_numbers(
        &self,
        date: &str,
        service_id: i64,
    ) -> Result<Vec<AvailableNumber>, ClientError> {
        let url = self.gateway().endpoints().reservables(date, service_id);
        let body = self.gateway().get(&url).await?.into_result()?;
        Ok(serde_json::from_value(body)?)
    }

    /// Call a ticket to the desk
    pub async fn call_ticket(&self, queue_id: i64) -> Result<Value, ClientError> {
        let url = self.gateway().endpoints().call(queue_id);
        tracing::info!(queue_id, "Calling ticket");
        self.gateway()
            .request(Method::POST, &url, crate::api::RequestBody::Empty)
            .await?
            .into_result()
    }

    /// Mark a ticket as served
    pub async fn finish_ticket(&self, queue_id: i64) -> Result<Value, ClientError> {
        let url = self.gateway().endpoints().finish(queue_id);
        tracing::info!(queue_id, "Finishing ticket");
        self.gateway()
            .request(Method::POST, &url, crate::api::RequestBody::Empty)
            .await?
            .into_result()
    }
}
