use shared::protocol::{CollectionQuery, Filter, FilterValue, SortDescriptor, SortDirection};
use thiserror::Error;

/// Page sizes the views offer in their pagination footer.
pub const PAGE_SIZES: [u32; 4] = [10, 25, 50, 100];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryStateError {
    #[error("page size {0} is not offered by the view (allowed: 10, 25, 50, 100)")]
    UnsupportedPageSize(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize(u32);

impl PageSize {
    pub fn new(value: u32) -> Result<Self, QueryStateError> {
        if PAGE_SIZES.contains(&value) {
            Ok(Self(value))
        } else {
            Err(QueryStateError::UnsupportedPageSize(value))
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(PAGE_SIZES[0])
    }
}

/// A recorded filter edit. `value: None` means the user cleared the widget;
/// the entry stays recorded but never reaches the outbound query.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub key: String,
    pub value: Option<FilterValue>,
}

/// The `{filters, pagination, sort}` tuple for one collection view. There is
/// no state machine beyond the tuple itself; the struct lives as long as the
/// view does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    page_index: u32,
    page_size: PageSize,
    filters: Vec<FilterEntry>,
    sort: Option<SortDescriptor>,
}

impl QueryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the filter for `key`, leaving every other entry untouched. A
    /// filter edit invalidates the meaning of the current page, so the view
    /// snaps back to the first one.
    pub fn set_filter(&mut self, key: impl Into<String>, value: Option<FilterValue>) {
        let key = key.into();
        match self.filters.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => self.filters.push(FilterEntry { key, value }),
        }
        self.page_index = 0;
    }

    /// Replaces the single active sort descriptor.
    pub fn set_sort(&mut self, column_id: impl Into<String>, direction: SortDirection) {
        self.sort = Some(SortDescriptor {
            column_id: column_id.into(),
            direction,
        });
        self.page_index = 0;
    }

    pub fn clear_sort(&mut self) {
        if self.sort.take().is_some() {
            self.page_index = 0;
        }
    }

    pub fn set_page(&mut self, page_index: u32) {
        self.page_index = page_index;
    }

    /// A new page size can leave `page_index` past the last page, so it
    /// resets to the first.
    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.page_size = page_size;
        self.page_index = 0;
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn filter(&self, key: &str) -> Option<&FilterValue> {
        self.filters
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn sort(&self) -> Option<&SortDescriptor> {
        self.sort.as_ref()
    }

    /// Builds the outbound query: cleared entries are dropped, and the
    /// supplied non-user-editable defaults win over user entries with the
    /// same key.
    pub fn normalized(&self, defaults: &[Filter]) -> CollectionQuery {
        let mut filters: Vec<Filter> = self
            .filters
            .iter()
            .filter(|entry| !defaults.iter().any(|default| default.key == entry.key))
            .filter_map(|entry| {
                entry.value.clone().map(|value| Filter {
                    key: entry.key.clone(),
                    value,
                })
            })
            .collect();
        filters.extend(defaults.iter().cloned());

        CollectionQuery {
            page_index: self.page_index,
            page_size: self.page_size.get(),
            filters,
            sort: self.sort.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
