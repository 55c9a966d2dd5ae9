/// WebSocket message types for client-server communication
use serde::{Deserialize, Serialize};

use crate::filter::FilterSpec;
use crate::grid::{GridStatus, VisibleRow};
use crate::row::Column;
use crate::sort::SortSpec;
use crate::state::GridAction;
use crate::window::Window;

/// Viewport height assumed until a client reports its own.
pub const DEFAULT_CONTAINER_HEIGHT: f64 = 600.0;

fn default_container_height() -> f64 {
    DEFAULT_CONTAINER_HEIGHT
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to grid updates
    Subscribe { grid_name: String },

    /// Request the visible window for a viewport of the given height
    Query {
        grid_name: String,
        #[serde(default = "default_container_height")]
        container_height: f64,
    },

    SetSort { grid_name: String, sort: Option<SortSpec> },

    AddFilter { grid_name: String, filter: FilterSpec },

    RemoveFilter { grid_name: String, field: String },

    ClearFilters { grid_name: String },

    AddGroup { grid_name: String, field: String },

    RemoveGroup { grid_name: String, field: String },

    ClearGroups { grid_name: String },

    ToggleGroupExpansion { grid_name: String, key: String },

    ReorderColumns { grid_name: String, order: Vec<String> },

    ToggleRowSelection { grid_name: String, id: String },

    SetScrollPosition { grid_name: String, top: f64, left: f64 },
}

impl ClientMessage {
    pub fn grid_name(&self) -> &str {
        match self {
            ClientMessage::Subscribe { grid_name }
            | ClientMessage::Query { grid_name, .. }
            | ClientMessage::SetSort { grid_name, .. }
            | ClientMessage::AddFilter { grid_name, .. }
            | ClientMessage::RemoveFilter { grid_name, .. }
            | ClientMessage::ClearFilters { grid_name }
            | ClientMessage::AddGroup { grid_name, .. }
            | ClientMessage::RemoveGroup { grid_name, .. }
            | ClientMessage::ClearGroups { grid_name }
            | ClientMessage::ToggleGroupExpansion { grid_name, .. }
            | ClientMessage::ReorderColumns { grid_name, .. }
            | ClientMessage::ToggleRowSelection { grid_name, .. }
            | ClientMessage::SetScrollPosition { grid_name, .. } => grid_name,
        }
    }

    /// The grid action this message requests, if it is an intent.
    pub fn into_action(self) -> Option<GridAction> {
        let action = match self {
            ClientMessage::Subscribe { .. } | ClientMessage::Query { .. } => return None,
            ClientMessage::SetSort { sort, .. } => GridAction::SetSort { sort },
            ClientMessage::AddFilter { filter, .. } => GridAction::AddFilter { filter },
            ClientMessage::RemoveFilter { field, .. } => GridAction::RemoveFilter { field },
            ClientMessage::ClearFilters { .. } => GridAction::ClearFilters,
            ClientMessage::AddGroup { field, .. } => GridAction::AddGroup { field },
            ClientMessage::RemoveGroup { field, .. } => GridAction::RemoveGroup { field },
            ClientMessage::ClearGroups { .. } => GridAction::ClearGroups,
            ClientMessage::ToggleGroupExpansion { key, .. } => GridAction::ToggleGroupExpansion { key },
            ClientMessage::ReorderColumns { order, .. } => GridAction::ReorderColumns { order },
            ClientMessage::ToggleRowSelection { id, .. } => GridAction::ToggleRowSelection { id },
            ClientMessage::SetScrollPosition { top, left, .. } => GridAction::SetScrollPosition { top, left },
        };
        Some(action)
    }
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Visible window of a grid, sent for Query and after every change
    Window {
        grid_name: String,
        columns: Vec<Column>,
        window: Window,
        rows: Vec<VisibleRow>,
        status: GridStatus,
    },

    /// Subscription confirmed
    Subscribed { grid_name: String },

    /// Error occurred
    Error { message: String },
}
