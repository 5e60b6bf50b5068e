use std::path::PathBuf;
use std::time::Duration;

use cardkit_core::config::ConfigError;
use cardkit_core::{ErrorKind, ProtocolError};

/// Errors surfaced by [`crate::Dispatcher::render`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to spawn worker {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker failed to start: {0}")]
    StartupFailed(String),

    #[error("worker {pid} exited before answering")]
    WorkerExited { pid: u32 },

    #[error("worker I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected frame from worker: {0}")]
    UnexpectedFrame(String),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("request too large: {0}")]
    TooLarge(String),

    #[error("worker render failed: {0}")]
    Render(String),

    #[error("worker reported a protocol error: {0}")]
    WorkerProtocol(String),

    #[error("worker binary not found: {0}")]
    WorkerNotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dispatcher is shut down")]
    Closed,
}

impl DispatchError {
    /// Map a worker `error` frame onto the taxonomy.
    pub fn from_worker(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Validation => DispatchError::Validation(message),
            ErrorKind::TooLarge => DispatchError::TooLarge(message),
            ErrorKind::Render => DispatchError::Render(message),
            ErrorKind::Protocol => DispatchError::WorkerProtocol(message),
        }
    }

    /// Transient failures are retried with a fresh worker; validation,
    /// oversize, and startup failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Spawn { .. }
            | DispatchError::WorkerExited { .. }
            | DispatchError::Io(_)
            | DispatchError::Timeout(_)
            | DispatchError::Protocol(_)
            | DispatchError::UnexpectedFrame(_)
            | DispatchError::Render(_)
            | DispatchError::WorkerProtocol(_) => true,
            DispatchError::StartupFailed(_)
            | DispatchError::Encode(_)
            | DispatchError::Validation(_)
            | DispatchError::TooLarge(_)
            | DispatchError::WorkerNotFound(_)
            | DispatchError::Config(_)
            | DispatchError::Closed => false,
        }
    }

    /// Whether the worker that produced this error can serve the next request.
    pub(crate) fn keeps_worker(&self) -> bool {
        matches!(self, DispatchError::Validation(_))
    }
}
