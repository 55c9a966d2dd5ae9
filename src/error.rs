/// LiveGrid error types
///
/// Pipeline stages never fail: unknown filter operators pass rows through and
/// incomparable sort keys tie. Errors only arise at the boundary to the worker
/// context, and the coordinator turns every one of them into a synchronous
/// fallback instead of handing it to the caller.

use crate::protocol::StageKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    /// No worker context could be started or it has already shut down.
    #[error("worker not available")]
    WorkerUnavailable,

    /// A message could not be posted to, or read back from, the worker.
    #[error("worker transport failed: {0}")]
    Transport(String),

    #[error("worker message could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The worker answered with an error payload.
    #[error("{stage} stage failed in worker: {message}")]
    Worker { stage: StageKind, message: String },

    /// The pending request was replaced by a newer one before it resolved.
    #[error("{0} request superseded by a newer request")]
    Superseded(StageKind),

    #[error("{0} request timed out")]
    Timeout(StageKind),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

pub type GridResult<T> = Result<T, GridError>;
