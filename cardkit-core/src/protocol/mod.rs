//! Worker wire protocol.
//!
//! Messages are JSON objects tagged by `type`, each followed by
//! [`FRAME_DELIMITER`]. The delimiter is a marker string rather than a bare
//! newline so payloads may carry embedded newlines (stack traces, SVG).
//!
//! Every `generate` carries a request id and every response echoes it, so a
//! host can match frames to requests without relying on one-in-flight.

mod chunk;
mod frame;

use serde::{Deserialize, Serialize};

use crate::request::{ContentType, RenderRequest};

pub use chunk::{ChunkAssembler, payload_messages, split_payload};
pub use frame::{FRAME_DELIMITER, FrameDecoder, encode_frame};

/// Frames sent from the host (dispatcher) to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Render one request
    Generate { request: RenderRequest },
    /// Finish queued work and exit cleanly
    Shutdown,
}

/// Frames sent from a worker back to its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Sent once after initialization completes
    Ready { pid: u32, version: String },
    /// Whole payload in a single frame
    Result {
        id: String,
        content_type: ContentType,
        /// Base64-encoded image bytes
        data: String,
    },
    /// Header announcing a chunked payload
    Chunks {
        id: String,
        content_type: ContentType,
        total: usize,
        /// Length of the full base64 string
        size: usize,
    },
    /// One slice of the base64 payload
    Chunk {
        id: String,
        index: usize,
        data: String,
    },
    /// Request failed, or the worker hit a protocol problem (`id` unset)
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl WorkerMessage {
    /// Request id this frame answers, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            WorkerMessage::Ready { .. } => None,
            WorkerMessage::Result { id, .. }
            | WorkerMessage::Chunks { id, .. }
            | WorkerMessage::Chunk { id, .. } => Some(id),
            WorkerMessage::Error { id, .. } => id.as_deref(),
        }
    }
}

/// Category of a worker-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad request shape, unknown component, invalid props
    Validation,
    /// Template, asset, or raster failure inside the worker
    Render,
    /// Malformed frame or unexpected message
    Protocol,
    /// Input buffer exceeded its ceiling; the worker is exiting
    TooLarge,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Render => "render",
            ErrorKind::Protocol => "protocol",
            ErrorKind::TooLarge => "too_large",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Framing and reassembly errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("buffered input of {buffered} bytes exceeds limit of {limit} bytes")]
    TooLarge { buffered: usize, limit: usize },

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkOutOfRange { index: usize, total: usize },

    #[error("chunk {0} received twice")]
    DuplicateChunk(usize),

    #[error("missing chunks: received {received} of {total}")]
    IncompleteChunks { received: usize, total: usize },

    #[error("reassembled size {actual} does not match announced size {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
