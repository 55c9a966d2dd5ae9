/// Offloaded execution context
///
/// A dedicated OS thread that owns nothing but two channels. It receives
/// serialized `WorkerRequest`s, runs the requested stage and answers with a
/// serialized `WorkerResponse`. Rows only ever cross the boundary as JSON,
/// so the context shares no memory with the grid.
///
/// Requests are answered strictly in the order they were received.

use crate::error::{GridError, GridResult};
use crate::filter::filter_rows;
use crate::group::group_rows_with_aggregates;
use crate::protocol::{StageKind, WorkerRequest, WorkerResponse};
use crate::sort::sort_rows;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::thread;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// The grid's end of a worker context: post requests, read responses.
#[derive(Debug)]
pub struct WorkerChannels {
    pub requests: UnboundedSender<String>,
    pub responses: UnboundedReceiver<String>,
}

/// Start a worker thread and return the channels connected to it.
///
/// The thread exits once every request sender has been dropped.
pub fn spawn_worker() -> GridResult<WorkerChannels> {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<String>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

    thread::Builder::new()
        .name("grid-worker".to_string())
        .spawn(move || {
            while let Some(message) = request_rx.blocking_recv() {
                if response_tx.send(handle_message(&message)).is_err() {
                    break;
                }
            }
            log::debug!("grid worker shutting down");
        })
        .map_err(|e| GridError::Transport(format!("failed to start worker thread: {}", e)))?;

    Ok(WorkerChannels {
        requests: request_tx,
        responses: response_rx,
    })
}

/// Answer one serialized request. Never fails: every problem becomes an
/// error response echoing the request's `type`.
pub fn handle_message(message: &str) -> String {
    let response = match serde_json::from_str::<JsonValue>(message) {
        Ok(json) => respond(json),
        Err(e) => WorkerResponse::failure("", e.to_string(), None),
    };

    match serde_json::to_string(&response) {
        Ok(text) => text,
        Err(e) => {
            log::error!("failed to serialize worker response: {}", e);
            serde_json::json!({
                "type": response.kind,
                "result": null,
                "error": e.to_string(),
            })
            .to_string()
        }
    }
}

fn respond(json: JsonValue) -> WorkerResponse {
    let kind = json
        .get("type")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    let seq = json.get("seq").and_then(JsonValue::as_u64);

    if StageKind::parse(&kind).is_none() {
        let message = format!("Unknown worker message type: {}", kind);
        return WorkerResponse::failure(kind, message, seq);
    }

    let request: WorkerRequest = match serde_json::from_value(json) {
        Ok(request) => request,
        Err(e) => return WorkerResponse::failure(kind, e.to_string(), seq),
    };

    match execute(request) {
        Ok(result) => WorkerResponse::success(kind, result, seq),
        Err(e) => WorkerResponse::failure(kind, e.to_string(), seq),
    }
}

fn execute(request: WorkerRequest) -> GridResult<JsonValue> {
    let result = match request {
        WorkerRequest::Filter { data, filters, .. } => serde_json::to_value(filter_rows(data, &filters))?,
        WorkerRequest::Sort { data, sort_config, .. } => serde_json::to_value(sort_rows(data, sort_config.as_ref()))?,
        WorkerRequest::Group {
            data,
            groups,
            expanded_groups,
            aggregates,
            ..
        } => {
            let expanded: HashSet<String> = expanded_groups.into_iter().collect();
            serde_json::to_value(group_rows_with_aggregates(data, &groups, &expanded, &aggregates))?
        }
    };
    Ok(result)
}
