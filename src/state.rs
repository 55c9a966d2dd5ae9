/// LiveGrid State Store
///
/// `GridState` is an immutable snapshot of everything the grid knows. It is
/// changed only through `reduce`, which applies one `GridAction` and returns
/// a new snapshot; every action replaces exactly one sub-field as a whole.
///
/// The row collection and the display list are shared through `Arc`, so
/// snapshots are cheap to clone and a pipeline run can read the rows while
/// the store moves on.
///
/// # Examples
///
/// ```
/// use livegrid::{reduce, Column, GridAction, GridState, Row};
///
/// let state = GridState::new(vec![Row::new("1")], vec![Column::new("dept", "Department")]);
/// let next = reduce(&state, GridAction::AddGroup { field: "dept".to_string() });
///
/// assert!(state.groups.is_empty());
/// assert_eq!(next.groups[0].field, "dept");
/// ```

use crate::filter::FilterSpec;
use crate::group::{toggle_group_expansion, GroupSpec};
use crate::pipeline::PipelineInput;
use crate::row::{Aggregator, Column, DisplayRow, Row};
use crate::sort::SortSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridState {
    pub data: Arc<Vec<Row>>,
    pub columns: Arc<Vec<Column>>,
    /// Column ids in display order. May name columns that no longer exist.
    pub column_order: Vec<String>,
    pub sort: Option<SortSpec>,
    pub filters: Vec<FilterSpec>,
    pub groups: Vec<GroupSpec>,
    pub expanded_groups: HashSet<String>,
    pub selected_rows: HashSet<String>,
    pub scroll_top: f64,
    pub scroll_left: f64,
    /// Output of the most recently published pipeline run.
    pub display: Arc<Vec<DisplayRow>>,
}

impl GridState {
    pub fn new(data: Vec<Row>, columns: Vec<Column>) -> Self {
        let column_order = columns.iter().map(|c| c.id.clone()).collect();
        GridState {
            data: Arc::new(data),
            columns: Arc::new(columns),
            column_order,
            ..Default::default()
        }
    }

    /// Snapshot of the pipeline inputs, computing `aggregates` on group headers.
    pub fn pipeline_input(&self, aggregates: Vec<(String, Aggregator)>) -> PipelineInput {
        PipelineInput {
            data: Arc::clone(&self.data),
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            groups: self.groups.clone(),
            expanded_groups: self.expanded_groups.clone(),
            aggregates,
        }
    }

    /// A copy of this state showing `display`.
    pub fn with_display(&self, display: Vec<DisplayRow>) -> Self {
        GridState {
            display: Arc::new(display),
            ..self.clone()
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_rows.contains(id)
    }
}

/// A user intent. Serialized as `{"type": "<Action>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GridAction {
    /// Replace the whole row collection.
    SetData { rows: Vec<Row> },
    SetSort { sort: Option<SortSpec> },
    /// Add a filter, replacing any existing filter on the same field.
    AddFilter { filter: FilterSpec },
    RemoveFilter { field: String },
    ClearFilters,
    /// Group by `field`, moving it to the end if it was already grouped.
    AddGroup { field: String },
    RemoveGroup { field: String },
    /// Remove every group and forget which groups were expanded.
    ClearGroups,
    ToggleGroupExpansion { key: String },
    ReorderColumns { order: Vec<String> },
    ToggleRowSelection { id: String },
    SetScrollPosition { top: f64, left: f64 },
}

impl GridAction {
    /// True if the action changes an input of the Filter → Sort → Group pipeline.
    pub fn affects_pipeline(&self) -> bool {
        !matches!(
            self,
            GridAction::ReorderColumns { .. }
                | GridAction::ToggleRowSelection { .. }
                | GridAction::SetScrollPosition { .. }
        )
    }
}

/// Apply `action` to `state`, returning the new state. `state` is untouched.
pub fn reduce(state: &GridState, action: GridAction) -> GridState {
    let mut next = state.clone();

    match action {
        GridAction::SetData { rows } => next.data = Arc::new(rows),
        GridAction::SetSort { sort } => next.sort = sort,
        GridAction::AddFilter { filter } => {
            let mut filters: Vec<FilterSpec> =
                state.filters.iter().filter(|f| f.field != filter.field).cloned().collect();
            filters.push(filter);
            next.filters = filters;
        }
        GridAction::RemoveFilter { field } => {
            next.filters = state.filters.iter().filter(|f| f.field != field).cloned().collect();
        }
        GridAction::ClearFilters => next.filters = Vec::new(),
        GridAction::AddGroup { field } => {
            let mut groups: Vec<GroupSpec> = state.groups.iter().filter(|g| g.field != field).cloned().collect();
            groups.push(GroupSpec::new(field));
            next.groups = groups;
        }
        GridAction::RemoveGroup { field } => {
            next.groups = state.groups.iter().filter(|g| g.field != field).cloned().collect();
        }
        GridAction::ClearGroups => {
            next.groups = Vec::new();
            next.expanded_groups = HashSet::new();
        }
        GridAction::ToggleGroupExpansion { key } => {
            next.expanded_groups = toggle_group_expansion(&state.expanded_groups, &key);
        }
        GridAction::ReorderColumns { order } => next.column_order = order,
        GridAction::ToggleRowSelection { id } => {
            let mut selected = state.selected_rows.clone();
            if !selected.remove(&id) {
                selected.insert(id);
            }
            next.selected_rows = selected;
        }
        GridAction::SetScrollPosition { top, left } => {
            next.scroll_top = top;
            next.scroll_left = left;
        }
    }

    next
}
