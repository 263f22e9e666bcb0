use serde::{Deserialize, Serialize};
use shared::domain::{CategoryId, ExpiryStatus, LocationId};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// The server silently caps `per_page` at this value.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    ExpiryDate,
    Name,
    Quantity,
    CreatedAt,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpiryDate => "expiry_date",
            Self::Name => "name",
            Self::Quantity => "quantity",
            Self::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// What a list view wants to see. Values are replaced, never edited: every
/// change produces a new descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    sort_by: SortBy,
    sort_order: SortOrder,
    category_filter: Option<CategoryId>,
    location_filter: Option<LocationId>,
    status_filter: Option<ExpiryStatus>,
    search_query: String,
    page: u32,
    page_size: u32,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl QueryDescriptor {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            category_filter: None,
            location_filter: None,
            status_filter: None,
            search_query: String::new(),
            page: 1,
            page_size: clamp_page_size(page_size),
        }
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn category_filter(&self) -> Option<CategoryId> {
        self.category_filter
    }

    pub fn location_filter(&self) -> Option<LocationId> {
        self.location_filter
    }

    pub fn status_filter(&self) -> Option<ExpiryStatus> {
        self.status_filter
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Merges `changes`. Returns `None` when nothing would actually change;
    /// otherwise the new descriptor, always positioned on page 1.
    pub fn apply(&self, changes: &QueryChanges) -> Option<Self> {
        let mut next = self.clone();
        if let Some(sort_by) = changes.sort_by {
            next.sort_by = sort_by;
        }
        if let Some(sort_order) = changes.sort_order {
            next.sort_order = sort_order;
        }
        if let Some(category) = changes.category_filter {
            next.category_filter = category;
        }
        if let Some(location) = changes.location_filter {
            next.location_filter = location;
        }
        if let Some(status) = changes.status_filter {
            next.status_filter = status;
        }
        if let Some(search) = &changes.search_query {
            next.search_query = search.trim().to_string();
        }
        if let Some(page_size) = changes.page_size {
            next.page_size = clamp_page_size(page_size);
        }

        if next.same_query(self) {
            return None;
        }
        next.page = 1;
        Some(next)
    }

    pub fn first_page(&self) -> Self {
        self.at_page(1)
    }

    pub fn next_page(&self) -> Self {
        self.at_page(self.page.saturating_add(1))
    }

    pub(crate) fn at_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    /// Equality over every field except `page`.
    pub fn same_query(&self, other: &Self) -> bool {
        self.sort_by == other.sort_by
            && self.sort_order == other.sort_order
            && self.category_filter == other.category_filter
            && self.location_filter == other.location_filter
            && self.status_filter == other.status_filter
            && self.search_query == other.search_query
            && self.page_size == other.page_size
    }
}

fn clamp_page_size(page_size: u32) -> u32 {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// A partial update to a [`QueryDescriptor`]. Filters use `Option<Option<_>>`
/// so that "clear the filter" and "leave it alone" stay distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryChanges {
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
    pub category_filter: Option<Option<CategoryId>>,
    pub location_filter: Option<Option<LocationId>>,
    pub status_filter: Option<Option<ExpiryStatus>>,
    pub search_query: Option<String>,
    pub page_size: Option<u32>,
}

impl QueryChanges {
    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn category(mut self, category: Option<CategoryId>) -> Self {
        self.category_filter = Some(category);
        self
    }

    pub fn location(mut self, location: Option<LocationId>) -> Self {
        self.location_filter = Some(location);
        self
    }

    pub fn status(mut self, status: Option<ExpiryStatus>) -> Self {
        self.status_filter = Some(status);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search_query = Some(search.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
