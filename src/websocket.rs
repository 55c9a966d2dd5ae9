/// WebSocket server for real-time grid updates
use actix::prelude::*;
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{GridError, GridResult};
use crate::grid::Grid;
use crate::messages::{ClientMessage, ServerMessage, DEFAULT_CONTAINER_HEIGHT};
use crate::row::{Aggregator, Column, ColumnKind, Row};
use crate::state::GridAction;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state for all WebSocket connections
pub struct AppState {
    pub grids: Arc<Mutex<HashMap<String, Grid>>>,
    pub subscribers: Arc<Mutex<HashMap<String, Vec<Addr<GridWebSocket>>>>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// State with a single `demo` grid.
    pub fn new() -> Self {
        let state = Self::empty();
        state.insert_grid("demo", demo_grid());
        state
    }

    pub fn empty() -> Self {
        Self {
            grids: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn insert_grid(&self, name: &str, grid: Grid) {
        lock(&self.grids).insert(name.to_string(), grid);
    }

    /// Apply an intent to the named grid
    pub fn dispatch(&self, grid_name: &str, action: GridAction) -> GridResult<()> {
        let mut grids = lock(&self.grids);
        let grid = grids
            .get_mut(grid_name)
            .ok_or_else(|| GridError::InvalidAction(format!("grid '{}' not found", grid_name)))?;
        grid.dispatch(action)?;
        grid.poll_results();
        Ok(())
    }

    /// Current window of the named grid for a viewport of `container_height`
    pub fn snapshot(&self, grid_name: &str, container_height: f64) -> GridResult<ServerMessage> {
        let mut grids = lock(&self.grids);
        let grid = grids
            .get_mut(grid_name)
            .ok_or_else(|| GridError::InvalidAction(format!("grid '{}' not found", grid_name)))?;
        grid.poll_results();

        Ok(ServerMessage::Window {
            grid_name: grid_name.to_string(),
            columns: grid.ordered_columns().into_iter().cloned().collect(),
            window: grid.window(container_height),
            rows: grid.visible_rows(container_height),
            status: grid.status(),
        })
    }

    /// Subscribe a WebSocket connection to a grid
    pub fn subscribe(&self, grid_name: &str, addr: Addr<GridWebSocket>) {
        let mut subscribers = lock(&self.subscribers);
        let addrs = subscribers.entry(grid_name.to_string()).or_default();
        if !addrs.contains(&addr) {
            addrs.push(addr);
        }
    }

    /// Tell every subscriber of a grid that it changed
    pub fn broadcast_change(&self, grid_name: &str) {
        let mut subscribers = lock(&self.subscribers);
        if let Some(addrs) = subscribers.get_mut(grid_name) {
            addrs.retain(|addr| addr.connected());
            for addr in addrs.iter() {
                addr.do_send(GridChanged(grid_name.to_string()));
            }
        }
    }
}

fn demo_grid() -> Grid {
    let depts = ["Engineering", "Sales", "Support", "Marketing"];
    let rows = (0..200)
        .map(|i| {
            Row::new(i.to_string())
                .with("name", format!("Employee {}", i))
                .with("department", depts[i % depts.len()])
                .with("salary", (50_000 + (i * 7_919) % 60_000) as i64)
                .with("active", i % 5 != 0)
        })
        .collect();

    let columns = vec![
        Column::new("name", "Name").with_kind(ColumnKind::String),
        Column::new("department", "Department").with_kind(ColumnKind::String),
        Column::new("salary", "Salary")
            .with_kind(ColumnKind::Number)
            .with_aggregator(Aggregator::Avg),
        Column::new("active", "Active").with_kind(ColumnKind::Boolean).groupable(false),
    ];

    Grid::new(rows, columns)
}

/// Sent to subscribers after a grid changed
#[derive(Message)]
#[rtype(result = "()")]
struct GridChanged(String);

/// WebSocket connection actor
pub struct GridWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    subscribed_grid: Option<String>,
    container_height: f64,
}

impl GridWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            subscribed_grid: None,
            container_height: DEFAULT_CONTAINER_HEIGHT,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::info!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(&self, msg: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(msg) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("failed to serialize server message: {}", e),
        }
    }

    fn send_error(&self, message: String, ctx: &mut ws::WebsocketContext<Self>) {
        self.send(&ServerMessage::Error { message }, ctx);
    }

    fn send_snapshot(&self, grid_name: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match self.state.snapshot(grid_name, self.container_height) {
            Ok(snapshot) => self.send(&snapshot, ctx),
            Err(e) => self.send_error(e.to_string(), ctx),
        }
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let grid_name = msg.grid_name().to_string();

        match msg {
            ClientMessage::Subscribe { .. } => {
                self.subscribed_grid = Some(grid_name.clone());
                self.state.subscribe(&grid_name, ctx.address());
                self.send(&ServerMessage::Subscribed { grid_name: grid_name.clone() }, ctx);
                self.send_snapshot(&grid_name, ctx);
            }

            ClientMessage::Query { container_height, .. } => {
                self.container_height = container_height;
                self.send_snapshot(&grid_name, ctx);
            }

            intent => {
                let Some(action) = intent.into_action() else {
                    return;
                };
                match self.state.dispatch(&grid_name, action) {
                    Ok(()) => {
                        self.state.broadcast_change(&grid_name);
                        if self.subscribed_grid.as_deref() != Some(grid_name.as_str()) {
                            self.send_snapshot(&grid_name, ctx);
                        }
                    }
                    Err(e) => self.send_error(e.to_string(), ctx),
                }
            }
        }
    }
}

impl Actor for GridWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for GridWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => self.send_error(format!("Invalid message format: {}", e), ctx),
            },
            Ok(ws::Message::Binary(_)) => {
                log::warn!("Unexpected binary message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<GridChanged> for GridWebSocket {
    type Result = ();

    fn handle(&mut self, msg: GridChanged, ctx: &mut Self::Context) {
        self.send_snapshot(&msg.0, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupSpec;

    #[test]
    fn test_dispatch_and_snapshot() {
        let state = AppState::new();
        state
            .dispatch("demo", GridAction::AddGroup { field: "department".to_string() })
            .unwrap();

        match state.snapshot("demo", 400.0).unwrap() {
            ServerMessage::Window { rows, status, columns, .. } => {
                assert_eq!(rows.len(), 4);
                assert!(rows.iter().all(|r| r.row.is_group()));
                assert_eq!(status.total_rows, 200);
                assert_eq!(columns.len(), 4);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let grids = lock(&state.grids);
        assert_eq!(grids["demo"].state().groups, vec![GroupSpec::new("department")]);
    }

    #[test]
    fn test_rejected_intents() {
        let state = AppState::new();
        assert!(state.dispatch("missing", GridAction::ClearFilters).is_err());
        assert!(state
            .dispatch("demo", GridAction::AddGroup { field: "active".to_string() })
            .is_err());
        assert!(state.snapshot("missing", 100.0).is_err());
    }
}
