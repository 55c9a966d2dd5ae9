/// LiveGrid Filter Engine
///
/// Reduces a row collection to the rows matching every active `FilterSpec`
/// (logical AND across fields). An empty spec list is the identity.
///
/// # Examples
///
/// ```
/// use livegrid::{filter_rows, FilterOperator, FilterSpec, Row};
///
/// let rows = vec![
///     Row::new("1").with("name", "Alice"),
///     Row::new("2").with("name", "Bob"),
/// ];
/// let specs = vec![FilterSpec::new("name", FilterOperator::Contains, "ali")];
///
/// let filtered = filter_rows(rows, &specs);
/// assert_eq!(filtered.len(), 1);
/// assert_eq!(filtered[0].id, "1");
/// ```

use crate::row::Row;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison applied by a filter.
///
/// Operators the grid does not recognise are kept as `Unknown` rather than
/// rejected, and let every row through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Gte,
    Lte,
    Unknown(String),
}

impl FilterOperator {
    pub fn as_str(&self) -> &str {
        match self {
            FilterOperator::Contains => "contains",
            FilterOperator::Equals => "equals",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::Gt => "gt",
            FilterOperator::Lt => "lt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lte => "lte",
            FilterOperator::Unknown(name) => name,
        }
    }
}

impl From<String> for FilterOperator {
    fn from(name: String) -> Self {
        match name.as_str() {
            "contains" => FilterOperator::Contains,
            "equals" => FilterOperator::Equals,
            "startsWith" => FilterOperator::StartsWith,
            "endsWith" => FilterOperator::EndsWith,
            "gt" => FilterOperator::Gt,
            "lt" => FilterOperator::Lt,
            "gte" => FilterOperator::Gte,
            "lte" => FilterOperator::Lte,
            _ => FilterOperator::Unknown(name),
        }
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate on one field. At most one spec per field is active in a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        FilterSpec {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluate this spec against a row.
    ///
    /// Substring operators compare lowercase string forms, so a null field
    /// matches as `"null"` and a missing one as `"undefined"`. Ordering
    /// operators coerce both sides to numbers; NaN never matches.
    pub fn matches(&self, row: &Row) -> bool {
        let field = row.get(&self.field);

        match &self.operator {
            FilterOperator::Contains => lower_form(field).contains(&self.needle()),
            FilterOperator::StartsWith => lower_form(field).starts_with(&self.needle()),
            FilterOperator::EndsWith => lower_form(field).ends_with(&self.needle()),
            FilterOperator::Equals => Value::strict_eq(field, &self.value),
            FilterOperator::Gt => Value::number_of(field) > self.value.to_number(),
            FilterOperator::Lt => Value::number_of(field) < self.value.to_number(),
            FilterOperator::Gte => Value::number_of(field) >= self.value.to_number(),
            FilterOperator::Lte => Value::number_of(field) <= self.value.to_number(),
            FilterOperator::Unknown(_) => true,
        }
    }

    fn needle(&self) -> String {
        self.value.to_string_form().to_lowercase()
    }
}

fn lower_form(value: Option<&Value>) -> String {
    Value::string_form_of(value).to_lowercase()
}

/// Returns true if the row satisfies every spec.
pub fn matches_all(row: &Row, specs: &[FilterSpec]) -> bool {
    specs.iter().all(|spec| spec.matches(row))
}

/// Keep the rows that satisfy every spec, preserving input order.
pub fn filter_rows(rows: Vec<Row>, specs: &[FilterSpec]) -> Vec<Row> {
    if specs.is_empty() {
        return rows;
    }
    rows.into_iter().filter(|row| matches_all(row, specs)).collect()
}
