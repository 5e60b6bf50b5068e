//! Worker side of the stdio protocol.
//!
//! One request is rendered at a time. Frames that arrive while a render is
//! in flight wait in the decoder queue and are answered in arrival order,
//! each response tagged with its request id.

use std::sync::Arc;
use std::time::Instant;

use cardkit_core::config::WorkerSettings;
use cardkit_core::protocol::payload_messages;
use cardkit_core::{
    ErrorKind, FrameDecoder, HostMessage, ProtocolError, RenderRequest, RenderResult,
    WorkerMessage, encode_frame, idle_timeout,
};
use cardkit_render::{RenderError, Renderer};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const READ_BUFFER: usize = 64 * 1024;

/// Renders one request. [`Renderer`] is the production implementation.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: &RenderRequest) -> Result<RenderResult, RenderError>;
}

#[async_trait::async_trait]
impl RequestHandler for Renderer {
    async fn handle(&self, request: &RenderRequest) -> Result<RenderResult, RenderError> {
        self.render(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// No input within the idle window
    Idle,
    /// Host closed stdin
    InputClosed,
    /// Host sent `shutdown`
    Shutdown,
    /// Buffered input exceeded `max_request_size`
    TooLarge,
}

impl ExitReason {
    pub fn code(&self) -> i32 {
        match self {
            ExitReason::TooLarge => 2,
            ExitReason::Idle | ExitReason::InputClosed | ExitReason::Shutdown => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("stdio failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("renderer unavailable: {0}")]
    Startup(#[from] RenderError),

    #[error("startup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct WorkerServer<R, W> {
    settings: WorkerSettings,
    handler: Arc<dyn RequestHandler>,
    reader: R,
    writer: W,
    requests: u64,
}

impl<R, W> WorkerServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        settings: WorkerSettings,
        handler: Arc<dyn RequestHandler>,
        reader: R,
        writer: W,
    ) -> Self {
        Self {
            settings,
            handler,
            reader,
            writer,
            requests: 0,
        }
    }

    /// Announce readiness, then serve until idle, EOF, shutdown, or overflow.
    pub async fn run(mut self) -> Result<ExitReason, WorkerError> {
        self.send(&WorkerMessage::Ready {
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .await?;

        let mut decoder = FrameDecoder::new(self.settings.max_request_size);
        let mut buf = vec![0u8; READ_BUFFER];

        loop {
            while let Some(frame) = decoder.next_frame() {
                if let Some(reason) = self.dispatch(&frame).await? {
                    return Ok(reason);
                }
            }

            let idle = idle_timeout(self.requests, &self.settings);
            tokio::select! {
                read = self.reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        info!(requests = self.requests, "input closed, exiting");
                        return Ok(ExitReason::InputClosed);
                    }
                    if let Err(ProtocolError::TooLarge { buffered, limit }) = decoder.push(&buf[..n]) {
                        warn!(buffered, limit, "request too large, exiting");
                        self.send(&WorkerMessage::Error {
                            id: None,
                            kind: ErrorKind::TooLarge,
                            message: format!(
                                "buffered input of {buffered} bytes exceeds limit of {limit} bytes"
                            ),
                            stack: None,
                        })
                        .await?;
                        return Ok(ExitReason::TooLarge);
                    }
                }
                _ = tokio::time::sleep(idle) => {
                    info!(
                        requests = self.requests,
                        idle_ms = idle.as_millis() as u64,
                        "idle shutdown"
                    );
                    return Ok(ExitReason::Idle);
                }
            }
        }
    }

    async fn dispatch(&mut self, frame: &[u8]) -> Result<Option<ExitReason>, WorkerError> {
        match serde_json::from_slice::<HostMessage>(frame) {
            Ok(HostMessage::Generate { request }) => {
                self.requests += 1;
                self.process(request).await?;
                Ok(None)
            }
            Ok(HostMessage::Shutdown) => {
                info!(requests = self.requests, "shutdown requested");
                Ok(Some(ExitReason::Shutdown))
            }
            Err(e) => {
                // A generate with a bad request body still names its id;
                // answer it so the host does not wait for a timeout.
                let id = request_id_hint(frame);
                let kind = if id.is_some() {
                    ErrorKind::Validation
                } else {
                    ErrorKind::Protocol
                };
                warn!(request_id = ?id, %kind, "rejected frame: {e}");
                self.send(&WorkerMessage::Error {
                    id,
                    kind,
                    message: format!("malformed frame: {e}"),
                    stack: None,
                })
                .await?;
                Ok(None)
            }
        }
    }

    async fn process(&mut self, request: RenderRequest) -> Result<(), WorkerError> {
        let started = Instant::now();
        debug!(request_id = %request.id, component = %request.component, "render started");

        match self.handler.handle(&request).await {
            Ok(result) => {
                let frames = payload_messages(
                    &request.id,
                    result.content_type,
                    &result.data,
                    self.settings.chunk_size,
                );
                info!(
                    request_id = %request.id,
                    component = %request.component,
                    content_type = %result.content_type,
                    bytes = result.data.len(),
                    frames = frames.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "render finished"
                );
                for frame in &frames {
                    self.send(frame).await?;
                }
            }
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    component = %request.component,
                    kind = %e.kind(),
                    "render failed: {e}"
                );
                self.send(&WorkerMessage::Error {
                    id: Some(request.id.clone()),
                    kind: e.kind(),
                    message: e.to_string(),
                    stack: error_chain(&e),
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: &WorkerMessage) -> Result<(), WorkerError> {
        let bytes = encode_frame(message)?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

fn request_id_hint(frame: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(frame).ok()?;
    value
        .pointer("/request/id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_chain(error: &dyn std::error::Error) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    if causes.is_empty() {
        None
    } else {
        Some(causes.join("\n"))
    }
}
