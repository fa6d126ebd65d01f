// Service desks as a cached collection

use super::{Resource, SortField, SortKey, Sorting};
use crate::api::Endpoints;
use crate::models::{NewService, Service};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceFilters {
    pub search: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSort {
    Id,
    Name,
    Room,
    FromTime,
    AvgMinute,
}

impl SortField<Service> for ServiceSort {
    fn key(&self, record: &Service) -> SortKey {
        match self {
            Self::Id => record.id.into(),
            Self::Name => record.name.as_str().into(),
            Self::Room => record.room.as_str().into(),
            Self::FromTime => record.from_time.as_str().into(),
            Self::AvgMinute => record.avg_minute.into(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Room => "room",
            Self::FromTime => "from_time",
            Self::AvgMinute => "avg_minute",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "name" => Self::Name,
            "room" => Self::Room,
            "from_time" => Self::FromTime,
            "avg_minute" => Self::AvgMinute,
            _ => return None,
        })
    }
}

impl Resource for Service {
    const NAME: &'static str = "service";

    type New = NewService;
    type Filters = ServiceFilters;
    type SortField = ServiceSort;

    fn id(&self) -> i64 {
        self.id
    }

    fn collection_url(endpoints: &Endpoints) -> String {
        endpoints.services()
    }

    fn item_url(endpoints: &Endpoints, id: i64) -> String {
        endpoints.service(id)
    }

    fn filter_params(filters: &ServiceFilters) -> Vec<(String, String)> {
        if filters.search.is_empty() {
            Vec::new()
        } else {
            vec![("search".to_string(), filters.search.clone())]
        }
    }

    fn matches(&self, filters: &ServiceFilters) -> bool {
        if filters.search.is_empty() {
            return true;
        }
        let needle = filters.search.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }

    fn default_sorting() -> Sorting<ServiceSort> {
        Sorting {
            sort_by: Some(ServiceSort::Name),
            direction: None,
        }
    }
}
