/// LiveGrid - Data Pipeline and Virtualization Engine for Large Grids
///
/// Turns a raw row collection plus user intents (sort, filter, group, expand,
/// select, scroll) into a display list of rows and synthetic group headers,
/// and computes which slice of it is visible for a scroll position when rows
/// have different heights. The Filter → Sort → Group pipeline runs either on
/// the calling thread or on an offloaded worker context, with synchronous
/// fallback whenever the worker fails.

pub mod value;
pub mod row;
pub mod filter;
pub mod sort;
pub mod group;
pub mod pipeline;
pub mod window;
pub mod protocol;
pub mod worker;
pub mod coordinator;
pub mod state;
pub mod grid;
pub mod error;

pub use value::{BucketKey, Value};
pub use row::{Aggregator, Column, ColumnKind, DetailRow, DisplayRow, GroupHeader, Row};
pub use filter::{filter_rows, matches_all, FilterOperator, FilterSpec};
pub use sort::{sort_rows, SortDirection, SortSpec};
pub use group::{group_key, group_rows, group_rows_with_aggregates, locale_compare, toggle_group_expansion, GroupSpec};
pub use pipeline::{run_filter, run_group, run_pipeline, run_sort, PipelineInput};
pub use window::{compute_window, fixed_window, HeightIndex, RowHeights, Window};
pub use protocol::{StageKind, WorkerRequest, WorkerResponse};
pub use worker::{handle_message, spawn_worker, WorkerChannels};
pub use coordinator::{CoordinatorConfig, CorrelationPolicy, ExecutionCoordinator, ExecutionMode, PipelineOutcome};
pub use state::{reduce, GridAction, GridState};
pub use grid::{move_column, Grid, GridConfig, GridStatus, VisibleRow};
pub use error::{GridError, GridResult};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;
