/// LiveGrid Pipeline
///
/// Composes the engines in a fixed order, Filter → Sort → Group, over a
/// snapshot of the grid state. The output display list is a deterministic
/// function of `(data, filters, sort, groups, expanded_groups)`.

use crate::filter::{filter_rows, FilterSpec};
use crate::group::{group_rows_with_aggregates, GroupSpec};
use crate::row::{Aggregator, DisplayRow, Row};
use crate::sort::{sort_rows, SortSpec};
use std::collections::HashSet;
use std::sync::Arc;

/// Everything one pipeline run reads. Cloning is cheap: the row collection
/// is shared, and every stage copies rows out of it rather than mutating it.
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub data: Arc<Vec<Row>>,
    pub filters: Vec<FilterSpec>,
    pub sort: Option<SortSpec>,
    pub groups: Vec<GroupSpec>,
    pub expanded_groups: HashSet<String>,
    /// Aggregates to compute on group headers, as `(field, aggregator)`.
    pub aggregates: Vec<(String, Aggregator)>,
}

impl PipelineInput {
    pub fn new(data: Vec<Row>) -> Self {
        PipelineInput {
            data: Arc::new(data),
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: Vec<FilterSpec>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sort(mut self, sort: Option<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupSpec>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_expanded(mut self, expanded: HashSet<String>) -> Self {
        self.expanded_groups = expanded;
        self
    }

    /// The expanded set as a list, the shape used on the wire.
    pub fn expanded_list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.expanded_groups.iter().cloned().collect();
        keys.sort();
        keys
    }
}

pub fn run_filter(rows: Vec<Row>, input: &PipelineInput) -> Vec<Row> {
    filter_rows(rows, &input.filters)
}

pub fn run_sort(rows: Vec<Row>, input: &PipelineInput) -> Vec<Row> {
    sort_rows(rows, input.sort.as_ref())
}

pub fn run_group(rows: Vec<Row>, input: &PipelineInput) -> Vec<DisplayRow> {
    group_rows_with_aggregates(rows, &input.groups, &input.expanded_groups, &input.aggregates)
}

/// Run all three stages synchronously on the calling thread.
pub fn run_pipeline(input: &PipelineInput) -> Vec<DisplayRow> {
    let rows = run_filter(input.data.as_ref().clone(), input);
    let rows = run_sort(rows, input);
    run_group(rows, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOperator;
    use crate::value::Value;

    fn employees() -> Vec<Row> {
        vec![
            Row::new("1").with("dept", "A").with("sal", 100),
            Row::new("2").with("dept", "B").with("sal", 200),
            Row::new("3").with("dept", "A").with("sal", 150),
        ]
    }

    #[test]
    fn test_filter_sort_group_scenario() {
        let input = PipelineInput::new(employees())
            .with_filters(vec![FilterSpec::new("sal", FilterOperator::Gte, 120)]);

        let filtered = run_filter(employees(), &input);
        let ids: Vec<&str> = filtered.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let input = input.with_sort(Some(SortSpec::descending("sal")));
        let sorted = run_sort(filtered, &input);
        let sals: Vec<Option<&Value>> = sorted.iter().map(|r| r.get("sal")).collect();
        assert_eq!(sals, vec![Some(&Value::from(200)), Some(&Value::from(150))]);

        let mut expanded = HashSet::new();
        expanded.insert("dept_A".to_string());
        let input = input
            .with_groups(vec![GroupSpec::new("dept")])
            .with_expanded(expanded);

        let display = run_pipeline(&input);
        assert_eq!(display.len(), 3);

        let a = display[0].as_group().unwrap();
        assert_eq!((a.key(), a.count, a.is_expanded), ("dept_A", 1, true));
        assert_eq!(display[1].id(), "3");
        assert!(!display[1].is_group());
        let b = display[2].as_group().unwrap();
        assert_eq!((b.key(), b.count, b.is_expanded), ("dept_B", 1, false));
    }

    #[test]
    fn test_group_counts_cover_sorted_rows() {
        let input = PipelineInput::new(employees())
            .with_sort(Some(SortSpec::ascending("sal")))
            .with_groups(vec![GroupSpec::new("dept")]);

        let display = run_pipeline(&input);
        let total: usize = display.iter().filter_map(|r| r.as_group()).map(|g| g.count).sum();
        assert_eq!(total, input.data.len());
    }

    #[test]
    fn test_pipeline_leaves_input_untouched() {
        let input = PipelineInput::new(employees()).with_sort(Some(SortSpec::descending("sal")));
        let _ = run_pipeline(&input);
        assert_eq!(*input.data, employees());
    }
}
