use serde::{Deserialize, Serialize};

/// A single filter value as the table widgets produce it. Unset filters are
/// represented by absence, never by a sentinel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Flag(bool),
}

impl FilterValue {
    pub fn to_query_value(&self) -> String {
        match self {
            FilterValue::Text(text) => text.clone(),
            FilterValue::Int(value) => value.to_string(),
            FilterValue::Flag(flag) => flag.to_string(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Flag(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub column_id: String,
    pub direction: SortDirection,
}

/// The normalized description of one list-view request. Two queries compare
/// equal exactly when they would ask the backend the same question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub page_index: u32,
    pub page_size: u32,
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDescriptor>,
}

impl CollectionQuery {
    /// Flattens the query into URL parameters the way the backend reads
    /// them: fixed pagination/sort keys, then one pair per filter.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page_index.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        if let Some(sort) = &self.sort {
            pairs.push(("sort_by".to_string(), sort.column_id.clone()));
            pairs.push(("sort_dir".to_string(), sort.direction.as_str().to_string()));
        }
        for filter in &self.filters {
            pairs.push((filter.key.clone(), filter.value.to_query_value()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Offset-paged body as the backend serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedEnvelope<T> {
    pub page_number: u32,
    pub page_size: u32,
    pub total_records: u64,
    pub last_page: u32,
    pub data: Vec<T>,
}

impl<T> From<PagedEnvelope<T>> for PageResult<T> {
    fn from(envelope: PagedEnvelope<T>) -> Self {
        Self {
            items: envelope.data,
            total_count: envelope.total_records,
        }
    }
}

/// Error body the backend attaches to rejected requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
