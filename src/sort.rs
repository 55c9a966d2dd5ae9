/// LiveGrid Sort Engine
///
/// Stably orders rows by a single field. Rows with equal keys keep their
/// input order, in both directions.
///
/// Keys compare by their native ordering (see `Value::native_cmp`). Pairs that
/// are neither less nor greater than each other, such as a number and a
/// non-numeric string or anything against a missing field, compare as a tie.
/// Across heterogeneous values that tie is not transitive, so the resulting
/// order for such columns is only "some stable order", never an error.

use crate::row::Row;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// The single active sort of a grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Compare two rows by this spec's field and direction.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let base = Value::native_cmp(a.get(&self.field), b.get(&self.field))
            .unwrap_or(Ordering::Equal);

        match self.direction {
            SortDirection::Asc => base,
            SortDirection::Desc => base.reverse(),
        }
    }
}

/// Sort rows by `spec`. `None` returns the rows untouched.
pub fn sort_rows(rows: Vec<Row>, spec: Option<&SortSpec>) -> Vec<Row> {
    match spec {
        Some(spec) => merge_sort_by(rows, &|a: &Row, b: &Row| spec.compare(a, b)),
        None => rows,
    }
}

/// Stable top-down merge sort.
///
/// `slice::sort_by` may panic when the comparator is not a total order, which
/// mixed-type columns produce. This one only ever asks "is right < left".
fn merge_sort_by<T, F>(mut items: Vec<T>, compare: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    if items.len() <= 1 {
        return items;
    }

    let right = items.split_off(items.len() / 2);
    let left = merge_sort_by(items, compare);
    let right = merge_sort_by(right, compare);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }

    merged
}
