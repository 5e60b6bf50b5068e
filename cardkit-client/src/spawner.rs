//! Worker child processes, seen from the host side.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cardkit_core::config::{Settings, WORKER_SETTINGS_ENV, WorkerSettings};
use cardkit_core::{
    ChunkAssembler, ContentType, FrameDecoder, HostMessage, RenderRequest, RenderResult,
    WorkerMessage, encode_frame, idle_timeout,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::DispatchError;

const WORKER_BINARY: &str = "cardkit-worker";

/// Reuse stops this long before the worker's own idle deadline, so a
/// request never races the worker's exit.
const REUSE_MARGIN: Duration = Duration::from_millis(500);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const READ_BUFFER: usize = 64 * 1024;

/// Locate the worker binary: explicit setting first, then next to the
/// running executable.
pub fn resolve_worker_path(configured: Option<&Path>) -> Result<PathBuf, DispatchError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let exe = std::env::current_exe()?;
    let candidate = exe.with_file_name(format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX));
    if candidate.exists() {
        Ok(candidate)
    } else {
        Err(DispatchError::WorkerNotFound(candidate.display().to_string()))
    }
}

/// A spawned worker that has completed its ready handshake.
pub struct WorkerHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    decoder: FrameDecoder,
    buf: Vec<u8>,
    pid: u32,
    version: String,
    requests: u64,
    last_used: Instant,
    worker_settings: WorkerSettings,
}

impl WorkerHandle {
    /// Spawn a worker and wait for its `ready` frame.
    pub async fn spawn(path: &Path, settings: &Settings) -> Result<Self, DispatchError> {
        let payload = settings.to_worker_payload()?;
        let mut child = Command::new(path)
            .env(WORKER_SETTINGS_ENV, payload)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DispatchError::StartupFailed("worker stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DispatchError::StartupFailed("worker stdout not captured".into()))?;

        let mut handle = Self {
            pid: child.id().unwrap_or_default(),
            child,
            stdin,
            stdout,
            // Responses are chunked, so the host only ever buffers a few
            // frames; the worker's own ceiling is a generous bound.
            decoder: FrameDecoder::new(settings.worker.max_request_size),
            buf: vec![0u8; READ_BUFFER],
            version: String::new(),
            requests: 0,
            last_used: Instant::now(),
            worker_settings: settings.worker.clone(),
        };

        let timeout = settings.dispatcher.startup_timeout();
        match tokio::time::timeout(timeout, handle.read_message()).await {
            Ok(Ok(WorkerMessage::Ready { pid, version })) => {
                handle.pid = pid;
                handle.version = version;
                handle.last_used = Instant::now();
                info!(worker_pid = pid, version = %handle.version, "worker ready");
                Ok(handle)
            }
            Ok(Ok(other)) => Err(DispatchError::StartupFailed(format!(
                "expected ready, got {other:?}"
            ))),
            Ok(Err(DispatchError::WorkerExited { .. })) => {
                let status = handle.child.wait().await?;
                Err(DispatchError::StartupFailed(format!(
                    "worker exited during startup ({status})"
                )))
            }
            Ok(Err(e)) => Err(DispatchError::StartupFailed(e.to_string())),
            Err(_) => {
                let _ = handle.child.start_kill();
                Err(DispatchError::StartupFailed(format!(
                    "no ready signal within {timeout:?}"
                )))
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Alive and comfortably inside its idle window.
    pub fn is_reusable(&mut self) -> bool {
        if !matches!(self.child.try_wait(), Ok(None)) {
            return false;
        }
        let window = idle_timeout(self.requests, &self.worker_settings).saturating_sub(REUSE_MARGIN);
        self.last_used.elapsed() < window
    }

    /// Send one `generate` and wait for its terminal response.
    pub async fn generate(
        &mut self,
        request: &RenderRequest,
        timeout: Duration,
    ) -> Result<RenderResult, DispatchError> {
        let frame = encode_frame(&HostMessage::Generate {
            request: request.clone(),
        })?;
        self.stdin.write_all(&frame).await?;
        self.stdin.flush().await?;
        self.requests += 1;

        let result = tokio::time::timeout(timeout, self.read_response(&request.id))
            .await
            .map_err(|_| DispatchError::Timeout(timeout))?;
        self.last_used = Instant::now();
        result
    }

    /// Ask the worker to exit, killing it if it does not within the grace
    /// period.
    pub async fn shutdown(mut self) {
        if let Ok(frame) = encode_frame(&HostMessage::Shutdown) {
            let _ = self.stdin.write_all(&frame).await;
            let _ = self.stdin.flush().await;
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(worker_pid = self.pid, %status, "worker stopped"),
            _ => {
                warn!(worker_pid = self.pid, "worker ignored shutdown, killing");
                let _ = self.child.kill().await;
            }
        }
    }

    async fn read_response(&mut self, request_id: &str) -> Result<RenderResult, DispatchError> {
        let mut pending: Option<(ContentType, ChunkAssembler)> = None;

        loop {
            let message = self.read_message().await?;
            if let Some(id) = message.request_id()
                && id != request_id
            {
                warn!(
                    worker_pid = self.pid,
                    request_id,
                    stray_id = id,
                    "discarding frame for another request"
                );
                continue;
            }

            match message {
                WorkerMessage::Result {
                    content_type, data, ..
                } => {
                    let data = STANDARD.decode(data).map_err(cardkit_core::ProtocolError::from)?;
                    return Ok(RenderResult { content_type, data });
                }
                WorkerMessage::Chunks {
                    content_type,
                    total,
                    size,
                    ..
                } => {
                    debug!(worker_pid = self.pid, request_id, total, size, "receiving chunks");
                    pending = Some((content_type, ChunkAssembler::new(total, size)));
                }
                WorkerMessage::Chunk { index, data, .. } => {
                    let Some((_, assembler)) = pending.as_mut() else {
                        return Err(DispatchError::UnexpectedFrame(format!(
                            "chunk {index} before chunks header"
                        )));
                    };
                    assembler.insert(index, data)?;
                }
                WorkerMessage::Error { kind, message, .. } => {
                    return Err(DispatchError::from_worker(kind, message));
                }
                WorkerMessage::Ready { .. } => {
                    return Err(DispatchError::UnexpectedFrame("second ready".into()));
                }
            }

            if pending.as_ref().is_some_and(|(_, a)| a.is_complete())
                && let Some((content_type, assembler)) = pending.take()
            {
                let data = assembler.finish()?;
                return Ok(RenderResult { content_type, data });
            }
        }
    }

    async fn read_message(&mut self) -> Result<WorkerMessage, DispatchError> {
        loop {
            if let Some(message) = self.decoder.next_message::<WorkerMessage>() {
                return Ok(message?);
            }
            let n = self.stdout.read(&mut self.buf).await?;
            if n == 0 {
                return Err(DispatchError::WorkerExited { pid: self.pid });
            }
            self.decoder.push(&self.buf[..n])?;
        }
    }
}
