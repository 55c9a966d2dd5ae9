/// LiveGrid Grid
///
/// The entry point a presentation layer talks to. A `Grid` owns the state
/// store, re-runs the pipeline through its `ExecutionCoordinator` whenever an
/// action changes a pipeline input, and answers windowing queries against
/// the published display list.
///
/// With a synchronous coordinator the new display list is in place before
/// `dispatch` returns. With an offloaded one the previous display list stays
/// visible until the run's outcome is collected with `poll_results`,
/// `next_outcome` or `settle`.
///
/// # Examples
///
/// ```
/// use livegrid::{Column, FilterOperator, FilterSpec, Grid, GridAction, Row};
///
/// let rows = vec![
///     Row::new("1").with("dept", "A").with("sal", 100),
///     Row::new("2").with("dept", "B").with("sal", 200),
/// ];
/// let columns = vec![Column::new("dept", "Department"), Column::new("sal", "Salary")];
///
/// let mut grid = Grid::new(rows, columns);
/// grid.dispatch(GridAction::AddFilter {
///     filter: FilterSpec::new("sal", FilterOperator::Gt, 150),
/// })
/// .unwrap();
///
/// assert_eq!(grid.display().len(), 1);
/// assert_eq!(grid.visible_rows(400.0)[0].row.id(), "2");
/// ```

use crate::coordinator::{CorrelationPolicy, ExecutionCoordinator, PipelineOutcome};
use crate::error::{GridError, GridResult};
use crate::row::{Aggregator, Column, DisplayRow, Row};
use crate::state::{reduce, GridAction, GridState};
use crate::window::{HeightIndex, RowHeights, Window};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Layout and feature switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridConfig {
    pub row_height: f64,
    pub header_height: f64,
    pub group_row_height: f64,
    /// Extra rows materialized beyond each viewport edge.
    pub overscan: usize,
    pub virtual_scrolling: bool,
    pub enable_grouping: bool,
    pub enable_column_dragging: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            row_height: 40.0,
            header_height: 50.0,
            group_row_height: 44.0,
            overscan: 5,
            virtual_scrolling: true,
            enable_grouping: true,
            enable_column_dragging: true,
        }
    }
}

impl GridConfig {
    pub fn row_heights(&self) -> RowHeights {
        RowHeights {
            row_height: self.row_height,
            group_row_height: self.group_row_height,
        }
    }
}

/// One materialized entry of the visible window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    /// Position in the display list.
    pub index: usize,
    pub offset: f64,
    pub height: f64,
    pub is_selected: bool,
    pub row: DisplayRow,
}

/// Summary for a status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStatus {
    pub total_rows: usize,
    pub display_rows: usize,
    pub selected_rows: usize,
    pub is_processing: bool,
    pub is_worker_available: bool,
}

/// Reordered column ids for dragging `dragged` onto `target`: `dragged` is
/// removed and re-inserted at the index `target` had before the move.
/// Unknown ids leave the order unchanged.
pub fn move_column(order: &[String], dragged: &str, target: &str) -> Vec<String> {
    let position = |id: &str| order.iter().position(|c| c == id);
    let mut next = order.to_vec();

    if let (Some(from), Some(to)) = (position(dragged), position(target)) {
        let column = next.remove(from);
        next.insert(to.min(next.len()), column);
    }
    next
}

pub struct Grid {
    config: GridConfig,
    state: GridState,
    coordinator: ExecutionCoordinator,
    results_tx: UnboundedSender<PipelineOutcome>,
    results_rx: UnboundedReceiver<PipelineOutcome>,
    heights: HeightIndex,
    /// Newest run whose outcome has been published.
    published_run: u64,
}

impl Grid {
    /// Grid with default configuration and synchronous execution.
    pub fn new(rows: Vec<Row>, columns: Vec<Column>) -> Self {
        Self::with_coordinator(rows, columns, GridConfig::default(), ExecutionCoordinator::synchronous())
    }

    pub fn with_config(rows: Vec<Row>, columns: Vec<Column>, config: GridConfig) -> Self {
        Self::with_coordinator(rows, columns, config, ExecutionCoordinator::synchronous())
    }

    pub fn with_coordinator(
        rows: Vec<Row>,
        columns: Vec<Column>,
        config: GridConfig,
        coordinator: ExecutionCoordinator,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let mut grid = Grid {
            config,
            state: GridState::new(rows, columns),
            coordinator,
            results_tx,
            results_rx,
            heights: HeightIndex::default(),
            published_run: 0,
        };
        grid.refresh();
        grid
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    pub fn display(&self) -> &[DisplayRow] {
        &self.state.display
    }

    pub fn columns(&self) -> &[Column] {
        &self.state.columns
    }

    pub fn column(&self, id: &str) -> GridResult<&Column> {
        self.state
            .columns
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GridError::UnknownColumn(id.to_string()))
    }

    /// Columns in the store's display order. Ids without a column are skipped.
    pub fn ordered_columns(&self) -> Vec<&Column> {
        self.state
            .column_order
            .iter()
            .filter_map(|id| self.state.columns.iter().find(|c| &c.id == id))
            .collect()
    }

    /// Apply a user intent. Actions touching a pipeline input re-run the
    /// pipeline.
    ///
    /// Fails with `InvalidAction` when the action targets a column whose
    /// capability flag forbids it, or a feature that is switched off.
    pub fn dispatch(&mut self, action: GridAction) -> GridResult<()> {
        self.validate(&action)?;

        let rerun = action.affects_pipeline();
        self.state = reduce(&self.state, action);
        if rerun {
            self.refresh();
        }
        Ok(())
    }

    fn validate(&self, action: &GridAction) -> GridResult<()> {
        match action {
            GridAction::SetSort { sort: Some(sort) } => self.require(&sort.field, "sort", |c| c.sortable),
            GridAction::AddFilter { filter } => self.require(&filter.field, "filter", |c| c.filterable),
            GridAction::AddGroup { field } => {
                if !self.config.enable_grouping {
                    return Err(GridError::InvalidAction("grouping is disabled".to_string()));
                }
                self.require(field, "group", |c| c.groupable)
            }
            GridAction::ReorderColumns { .. } if !self.config.enable_column_dragging => {
                Err(GridError::InvalidAction("column reordering is disabled".to_string()))
            }
            _ => Ok(()),
        }
    }

    // Fields without column metadata are allowed; rows are open maps.
    fn require<F>(&self, field: &str, verb: &str, allowed: F) -> GridResult<()>
    where
        F: Fn(&Column) -> bool,
    {
        match self.state.columns.iter().find(|c| c.field == field) {
            Some(column) if !allowed(column) => Err(GridError::InvalidAction(format!(
                "cannot {} by column '{}'",
                verb, column.id
            ))),
            _ => Ok(()),
        }
    }

    fn aggregates(&self) -> Vec<(String, Aggregator)> {
        self.state
            .columns
            .iter()
            .filter_map(|c| c.aggregator.map(|a| (c.field.clone(), a)))
            .collect()
    }

    fn refresh(&mut self) {
        let input = self.state.pipeline_input(self.aggregates());

        if self.coordinator.is_worker_available() {
            self.coordinator.spawn_run(input, self.results_tx.clone());
            self.poll_results();
        } else {
            let outcome = self.coordinator.run_sync(&input);
            self.apply(outcome);
        }
    }

    /// Publish every outcome that has already arrived. Returns how many were
    /// applied.
    pub fn poll_results(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.results_rx.try_recv() {
            if self.apply(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next outcome and publish it. Returns its run id, or
    /// `None` if it was discarded as stale.
    pub async fn next_outcome(&mut self) -> Option<u64> {
        let outcome = self.results_rx.recv().await?;
        let run_id = outcome.run_id;
        self.apply(outcome).then_some(run_id)
    }

    /// Wait until the most recent run has published, or until no run is in
    /// flight any more. The latter happens when a newer run was abandoned
    /// after an older one took over its callback; whatever the older run
    /// published is then the current display list.
    pub async fn settle(&mut self) {
        let mut in_flight = self.coordinator.watch_runs();
        loop {
            // Outcomes are sent before their run leaves the count, so an idle
            // count means everything is already queued.
            let idle = *in_flight.borrow_and_update() == 0;
            self.poll_results();
            if idle || self.published_run >= self.coordinator.current_run() {
                return;
            }

            let received = tokio::select! {
                outcome = self.results_rx.recv() => match outcome {
                    Some(outcome) => Some(outcome),
                    None => return,
                },
                changed = in_flight.changed() => match changed {
                    Ok(()) => None,
                    Err(_) => return,
                },
            };
            if let Some(outcome) = received {
                self.apply(outcome);
            }
        }
    }

    fn apply(&mut self, outcome: PipelineOutcome) -> bool {
        let latest = self.coordinator.current_run();
        if self.coordinator.config().correlation == CorrelationPolicy::BySequence && outcome.run_id != latest {
            log::debug!("discarding outcome of run {} (latest is {})", outcome.run_id, latest);
            return false;
        }

        self.published_run = self.published_run.max(outcome.run_id);
        let heights = self.config.row_heights();
        self.heights = HeightIndex::build(&outcome.display, |row| heights.height_of(row));
        self.state = self.state.with_display(outcome.display);
        true
    }

    /// The visible slice for a viewport of `container_height` at the current
    /// scroll position. Without virtual scrolling the whole list is returned.
    pub fn window(&self, container_height: f64) -> Window {
        if self.config.virtual_scrolling {
            self.heights
                .window(self.state.scroll_top, container_height, self.config.overscan, self.config.row_height)
        } else {
            self.heights.window(0.0, self.heights.total_height(), 0, self.config.row_height)
        }
    }

    pub fn visible_rows(&self, container_height: f64) -> Vec<VisibleRow> {
        let window = self.window(container_height);
        window.iter().filter_map(|(index, _)| self.visible_row(index)).collect()
    }

    /// Entry `index` of the display list with its position and selection state.
    pub fn visible_row(&self, index: usize) -> Option<VisibleRow> {
        let row = self.state.display.get(index)?;
        let offset = self.heights.offset_at(index)?;
        Some(VisibleRow {
            index,
            offset,
            height: self.config.row_heights().height_of(row),
            is_selected: self.state.is_selected(row.id()),
            row: row.clone(),
        })
    }

    pub fn total_height(&self) -> f64 {
        self.heights.total_height()
    }

    pub fn is_processing(&self) -> bool {
        self.coordinator.is_processing()
    }

    pub fn is_worker_available(&self) -> bool {
        self.coordinator.is_worker_available()
    }

    pub fn status(&self) -> GridStatus {
        GridStatus {
            total_rows: self.state.data.len(),
            display_rows: self.state.display.len(),
            selected_rows: self.state.selected_rows.len(),
            is_processing: self.is_processing(),
            is_worker_available: self.is_worker_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::filter::{FilterOperator, FilterSpec};
    use crate::sort::SortSpec;
    use crate::worker::{handle_message, WorkerChannels};
    use std::time::Duration;

    fn rows() -> Vec<Row> {
        (0..20)
            .map(|i| {
                Row::new(i.to_string())
                    .with("dept", ["A", "B", "C"][i % 3])
                    .with("sal", (100 + i * 10) as i64)
            })
            .collect()
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("dept", "Department"),
            Column::new("sal", "Salary").with_aggregator(Aggregator::Sum),
            Column::new("note", "Note").sortable(false).groupable(false),
        ]
    }

    fn ids(grid: &Grid) -> Vec<&str> {
        grid.display().iter().map(|r| r.id()).collect()
    }

    fn action_key(key: &str) -> GridAction {
        GridAction::ToggleGroupExpansion { key: key.to_string() }
    }

    #[test]
    fn test_initial_display_is_the_data() {
        let grid = Grid::new(rows(), columns());
        assert_eq!(grid.display().len(), 20);
        assert_eq!(grid.total_height(), 800.0);
        assert!(!grid.is_worker_available());
    }

    #[test]
    fn test_dispatch_reruns_pipeline() {
        let mut grid = Grid::new(rows(), columns());
        grid.dispatch(GridAction::AddFilter {
            filter: FilterSpec::new("sal", FilterOperator::Gte, 250),
        })
        .unwrap();
        grid.dispatch(GridAction::SetSort { sort: Some(SortSpec::descending("sal")) }).unwrap();
        assert_eq!(ids(&grid), vec!["19", "18", "17", "16", "15"]);

        grid.dispatch(GridAction::AddGroup { field: "dept".to_string() }).unwrap();
        assert_eq!(ids(&grid), vec!["dept_A", "dept_B", "dept_C"]);

        grid.dispatch(action_key("dept_B")).unwrap();
        assert_eq!(ids(&grid), vec!["dept_A", "dept_B", "19", "16", "dept_C"]);

        // Headers carry the column aggregates
        let a = grid.display()[0].as_group().unwrap();
        assert_eq!(a.count, 2);
        assert_eq!(a.aggregates.get("sal"), Some(&(280.0 + 250.0)));
    }

    #[test]
    fn test_capability_flags_are_enforced() {
        let mut grid = Grid::new(rows(), columns());
        let err = grid
            .dispatch(GridAction::SetSort { sort: Some(SortSpec::ascending("note")) })
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidAction(_)));
        assert!(grid.state().sort.is_none());

        assert!(grid.dispatch(GridAction::AddGroup { field: "note".to_string() }).is_err());
        // Filtering the same column is allowed, as is any field without metadata
        assert!(grid
            .dispatch(GridAction::AddFilter {
                filter: FilterSpec::new("note", FilterOperator::Contains, "x"),
            })
            .is_ok());
        assert!(grid.dispatch(GridAction::SetSort { sort: Some(SortSpec::ascending("other")) }).is_ok());
    }

    #[test]
    fn test_disabled_features() {
        let config = GridConfig {
            enable_grouping: false,
            enable_column_dragging: false,
            ..Default::default()
        };
        let mut grid = Grid::with_config(rows(), columns(), config);
        assert!(grid.dispatch(GridAction::AddGroup { field: "dept".to_string() }).is_err());
        assert!(grid.dispatch(GridAction::ReorderColumns { order: vec![] }).is_err());
    }

    #[test]
    fn test_ordered_columns() {
        let mut grid = Grid::new(rows(), columns());
        let order = move_column(&grid.state().column_order, "note", "dept");
        assert_eq!(order, vec!["note", "dept", "sal"]);

        let mut with_stale = order.clone();
        with_stale.push("removed".to_string());
        grid.dispatch(GridAction::ReorderColumns { order: with_stale }).unwrap();

        let ids: Vec<&str> = grid.ordered_columns().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["note", "dept", "sal"]);
        assert_eq!(grid.column("sal").unwrap().header_name, "Salary");
        assert!(matches!(grid.column("removed"), Err(GridError::UnknownColumn(_))));
    }

    #[test]
    fn test_move_column() {
        let order: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(move_column(&order, "a", "c"), vec!["b", "c", "a", "d"]);
        assert_eq!(move_column(&order, "d", "b"), vec!["a", "d", "b", "c"]);
        assert_eq!(move_column(&order, "a", "d"), vec!["b", "c", "d", "a"]);
        assert_eq!(move_column(&order, "a", "zz"), order);
    }

    #[test]
    fn test_visible_rows_follow_scroll() {
        let config = GridConfig {
            overscan: 0,
            ..Default::default()
        };
        let mut grid = Grid::with_config(rows(), columns(), config);
        grid.dispatch(GridAction::ToggleRowSelection { id: "3".to_string() }).unwrap();

        let visible = grid.visible_rows(100.0);
        let ids: Vec<&str> = visible.iter().map(|v| v.row.id()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);

        grid.dispatch(GridAction::SetScrollPosition { top: 100.0, left: 0.0 }).unwrap();
        let visible = grid.visible_rows(100.0);
        let ids: Vec<&str> = visible.iter().map(|v| v.row.id()).collect();
        assert_eq!(ids, vec!["2", "3", "4", "5"]);
        assert_eq!(visible[0].offset, 80.0);
        assert!(visible[1].is_selected);
        assert!(!visible[0].is_selected);
    }

    #[test]
    fn test_group_headers_use_their_own_height() {
        let mut grid = Grid::new(rows(), columns());
        grid.dispatch(GridAction::AddGroup { field: "dept".to_string() }).unwrap();
        grid.dispatch(action_key("dept_A")).unwrap();

        // Header A (44) + 7 members (40 each) + headers B and C (44 each)
        assert_eq!(grid.total_height(), 44.0 * 3.0 + 40.0 * 7.0);
        let row = grid.visible_row(1).unwrap();
        assert_eq!((row.offset, row.height), (44.0, 40.0));
        let header = grid.visible_row(8).unwrap();
        assert!(header.row.is_group());
        assert_eq!((header.offset, header.height), (44.0 + 280.0, 44.0));
        assert!(grid.visible_row(99).is_none());
    }

    #[test]
    fn test_without_virtual_scrolling_everything_is_visible() {
        let config = GridConfig {
            virtual_scrolling: false,
            ..Default::default()
        };
        let grid = Grid::with_config(rows(), columns(), config);
        assert_eq!(grid.visible_rows(100.0).len(), 20);
    }

    #[test]
    fn test_status() {
        let mut grid = Grid::new(rows(), columns());
        grid.dispatch(GridAction::AddFilter {
            filter: FilterSpec::new("dept", FilterOperator::Equals, "A"),
        })
        .unwrap();
        grid.dispatch(GridAction::ToggleRowSelection { id: "0".to_string() }).unwrap();

        assert_eq!(
            grid.status(),
            GridStatus {
                total_rows: 20,
                display_rows: 7,
                selected_rows: 1,
                is_processing: false,
                is_worker_available: false,
            }
        );
    }

    #[tokio::test]
    async fn test_offloaded_grid_publishes_on_outcome() {
        let coordinator = ExecutionCoordinator::new(CoordinatorConfig::default());
        let mut grid = Grid::with_coordinator(rows(), columns(), GridConfig::default(), coordinator);
        assert!(grid.is_worker_available());

        grid.dispatch(GridAction::AddFilter {
            filter: FilterSpec::new("sal", FilterOperator::Lt, 120),
        })
        .unwrap();

        let target = grid.coordinator().current_run();
        while grid.next_outcome().await != Some(target) {}
        assert_eq!(ids(&grid), vec!["0", "1"]);
        assert!(!grid.status().is_processing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_settle_waits_for_latest_run() {
        let coordinator = ExecutionCoordinator::new(CoordinatorConfig::default());
        let mut grid = Grid::with_coordinator(rows(), columns(), GridConfig::default(), coordinator);

        grid.dispatch(GridAction::AddFilter {
            filter: FilterSpec::new("sal", FilterOperator::Lt, 120),
        })
        .unwrap();
        grid.dispatch(GridAction::SetSort { sort: Some(SortSpec::descending("sal")) })
            .unwrap();
        grid.settle().await;

        assert_eq!(ids(&grid), vec!["1", "0"]);
        assert!(!grid.is_processing());
    }

    #[tokio::test]
    async fn test_settle_returns_when_latest_run_is_abandoned() {
        let (request_tx, mut requests) = mpsc::unbounded_channel();
        let (responses, response_rx) = mpsc::unbounded_channel();
        let coordinator = ExecutionCoordinator::with_worker(
            CoordinatorConfig::default(),
            WorkerChannels { requests: request_tx, responses: response_rx },
        );
        let mut grid = Grid::with_coordinator(rows(), columns(), GridConfig::default(), coordinator);

        grid.dispatch(GridAction::SetSort { sort: Some(SortSpec::descending("sal")) })
            .unwrap();
        let sort = requests.recv().await.unwrap();
        responses.send(handle_message(&sort)).unwrap();
        grid.settle().await;
        assert_eq!(grid.display()[0].id(), "19");

        // Filter run waits on its FILTER while a newer sort-only run posts SORT
        grid.dispatch(GridAction::AddFilter {
            filter: FilterSpec::new("sal", FilterOperator::Lt, 120),
        })
        .unwrap();
        let filter = requests.recv().await.unwrap();
        grid.dispatch(GridAction::ClearFilters).unwrap();
        let newer_sort = requests.recv().await.unwrap();

        // The filter run moves on and takes the SORT slot, abandoning the newer run
        responses.send(handle_message(&filter)).unwrap();
        let older_sort = requests.recv().await.unwrap();
        responses.send(handle_message(&newer_sort)).unwrap();
        responses.send(handle_message(&older_sort)).unwrap();

        tokio::time::timeout(Duration::from_secs(5), grid.settle())
            .await
            .expect("settle should return once no run is in flight");
        assert_eq!(grid.display().len(), 20);
        assert!(!grid.is_processing());
        assert_eq!(grid.coordinator().runs_in_flight(), 0);
    }
}
