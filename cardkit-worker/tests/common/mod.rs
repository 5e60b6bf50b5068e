//! Shared helpers for worker integration tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use cardkit_core::config::WORKER_SETTINGS_ENV;
use cardkit_core::{FrameDecoder, HostMessage, Settings, WorkerMessage, encode_frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub fn worker_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cardkit-worker"))
}

/// Settings that never touch system fonts or the network-backed font check.
pub fn test_settings(cache_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.assets.require_fonts = false;
    settings.assets.load_system_fonts = false;
    settings.assets.cache_dir = Some(cache_dir.to_path_buf());
    settings.dispatcher.worker_path = Some(worker_path());
    settings.dispatcher.initial_delay_ms = 10;
    settings
}

/// A worker process driven directly over its stdio.
pub struct RawWorker {
    pub child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    decoder: FrameDecoder,
}

#[allow(dead_code)]
impl RawWorker {
    pub fn spawn(settings: &Settings) -> Self {
        let mut child = Command::new(worker_path())
            .env(WORKER_SETTINGS_ENV, settings.to_worker_payload().unwrap())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("worker binary should spawn");
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().unwrap();
        Self {
            child,
            stdin,
            stdout,
            decoder: FrameDecoder::new(usize::MAX),
        }
    }

    pub async fn send(&mut self, message: &HostMessage) {
        self.send_raw(&encode_frame(message).unwrap()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stdin = self.stdin.as_mut().expect("stdin closed");
        stdin.write_all(bytes).await.unwrap();
        stdin.flush().await.unwrap();
    }

    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    pub async fn recv(&mut self) -> WorkerMessage {
        let mut buf = [0u8; 64 * 1024];
        loop {
            if let Some(message) = self.decoder.next_message::<WorkerMessage>() {
                return message.unwrap();
            }
            let n = self.stdout.read(&mut buf).await.unwrap();
            assert!(n > 0, "worker closed stdout");
            self.decoder.push(&buf[..n]).unwrap();
        }
    }

    pub async fn exit_code(&mut self) -> i32 {
        let status = tokio::time::timeout(std::time::Duration::from_secs(10), self.child.wait())
            .await
            .expect("worker should exit")
            .unwrap();
        status.code().expect("worker exited by signal")
    }
}
