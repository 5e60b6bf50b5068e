use std::process::Stdio;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cardkit_core::config::SceneSettings;
use cardkit_core::{FrameDecoder, encode_frame};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::{SceneBackend, SceneError, ScenePage};

/// Largest frame a scene host may send back.
const MAX_REPLY: usize = 32 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SceneCommand<'a> {
    Init {
        session_id: &'a str,
        script: &'a str,
        options: &'a Value,
    },
    Update {
        session_id: &'a str,
        options: &'a Value,
    },
    Close {
        session_id: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SceneReply {
    /// Base64-encoded image
    Frame { data: String },
    Error { message: String },
}

/// Launches the configured scene host command once per session. The host
/// speaks the worker framing on its stdio.
#[derive(Debug, Clone)]
pub struct ProcessSceneBackend {
    command: Vec<String>,
}

impl ProcessSceneBackend {
    pub fn new(settings: &SceneSettings) -> Result<Self, SceneError> {
        if settings.command.is_empty() {
            return Err(SceneError::NotConfigured);
        }
        Ok(Self {
            command: settings.command.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SceneBackend for ProcessSceneBackend {
    async fn open_page(&self, session_id: &str) -> Result<Box<dyn ScenePage>, SceneError> {
        let (program, args) = self.command.split_first().ok_or(SceneError::NotConfigured)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(SceneError::Launch)?;
        let stdin = child.stdin.take().ok_or(SceneError::HostExited)?;
        let stdout = child.stdout.take().ok_or(SceneError::HostExited)?;
        debug!(session_id, host_pid = ?child.id(), "scene host started");

        Ok(Box::new(ProcessPage {
            session_id: session_id.to_string(),
            child,
            stdin,
            stdout,
            decoder: FrameDecoder::new(MAX_REPLY),
        }))
    }
}

struct ProcessPage {
    session_id: String,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    decoder: FrameDecoder,
}

impl ProcessPage {
    async fn send(&mut self, command: &SceneCommand<'_>) -> Result<(), SceneError> {
        let frame = encode_frame(command)?;
        self.stdin.write_all(&frame).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn frame(&mut self) -> Result<Vec<u8>, SceneError> {
        let mut buf = [0u8; 16 * 1024];
        loop {
            if let Some(reply) = self.decoder.next_message::<SceneReply>() {
                return match reply? {
                    SceneReply::Frame { data } => Ok(STANDARD
                        .decode(data)
                        .map_err(cardkit_core::ProtocolError::from)?),
                    SceneReply::Error { message } => Err(SceneError::Render(message)),
                };
            }
            let n = self.stdout.read(&mut buf).await?;
            if n == 0 {
                return Err(SceneError::HostExited);
            }
            self.decoder.push(&buf[..n])?;
        }
    }
}

#[async_trait::async_trait]
impl ScenePage for ProcessPage {
    async fn initialize(&mut self, init_script: &str, options: &Value) -> Result<Vec<u8>, SceneError> {
        let session_id = self.session_id.clone();
        self.send(&SceneCommand::Init {
            session_id: &session_id,
            script: init_script,
            options,
        })
        .await?;
        self.frame().await
    }

    async fn update(&mut self, options: &Value) -> Result<Vec<u8>, SceneError> {
        let session_id = self.session_id.clone();
        self.send(&SceneCommand::Update {
            session_id: &session_id,
            options,
        })
        .await?;
        self.frame().await
    }

    async fn close(&mut self) -> Result<(), SceneError> {
        let session_id = self.session_id.clone();
        // The host may already be gone; the kill below covers that.
        let _ = self
            .send(&SceneCommand::Close {
                session_id: &session_id,
            })
            .await;
        self.child.kill().await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(script: &str) -> ProcessSceneBackend {
        ProcessSceneBackend::new(&SceneSettings {
            command: vec!["sh".into(), "-c".into(), script.into()],
            idle_timeout_ms: 1000,
            render_timeout_ms: 1000,
        })
        .unwrap()
    }

    #[test]
    fn test_requires_command() {
        let settings = SceneSettings {
            command: Vec::new(),
            idle_timeout_ms: 1000,
            render_timeout_ms: 1000,
        };
        assert!(matches!(
            ProcessSceneBackend::new(&settings),
            Err(SceneError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_frame_reply_is_decoded() {
        // "AQI=" is base64 for [1, 2].
        let host = backend(
            r#"printf '{"type":"frame","data":"AQI="}\n<<CARDKIT_END>>\n'; cat >/dev/null"#,
        );
        let mut page = host.open_page("s1").await.unwrap();
        assert_eq!(page.initialize("init()", &json!({})).await.unwrap(), vec![1, 2]);
        page.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_and_exit() {
        let host = backend(
            r#"printf '{"type":"error","message":"no webgl"}\n<<CARDKIT_END>>\n'; cat >/dev/null"#,
        );
        let mut page = host.open_page("s1").await.unwrap();
        assert!(matches!(
            page.initialize("init()", &json!({})).await,
            Err(SceneError::Render(m)) if m == "no webgl"
        ));

        let mut page = backend("exit 0").open_page("s2").await.unwrap();
        assert!(matches!(
            page.update(&json!({})).await,
            Err(SceneError::HostExited) | Err(SceneError::Io(_))
        ));
    }
}
