use serde::{Deserialize, Serialize};
use shared::protocol::FilterValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: FilterValue,
    pub label: String,
}

/// Filter widget a column offers, with the payload each widget needs. One
/// variant per widget instead of an open-ended property bag, so a view
/// cannot wire a select filter without options or a range without both
/// bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    Text {
        key: String,
        placeholder: String,
    },
    Select {
        key: String,
        options: Vec<SelectOption>,
    },
    Date {
        key: String,
        placeholder: String,
    },
    DateRange {
        start_key: String,
        end_key: String,
        start_placeholder: String,
        end_placeholder: String,
    },
    DateTime {
        key: String,
        placeholder: String,
    },
}

impl FilterKind {
    /// Query keys this filter contributes; a date range owns two.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            FilterKind::Text { key, .. }
            | FilterKind::Select { key, .. }
            | FilterKind::Date { key, .. }
            | FilterKind::DateTime { key, .. } => vec![key],
            FilterKind::DateRange {
                start_key, end_key, ..
            } => vec![start_key, end_key],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub id: String,
    pub header: String,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterKind>,
}

impl ColumnSpec {
    pub fn filter_keys(&self) -> Vec<&str> {
        self.filter
            .as_ref()
            .map(FilterKind::keys)
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "tests/columns_tests.rs"]
mod tests;
