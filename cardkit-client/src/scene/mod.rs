//! Interactive 3D render sessions.
//!
//! A session wraps one page in an external headless-browser host. The first
//! render (or a forced one) runs the full initialization script; later
//! renders only send update parameters. Sessions expire after a period of
//! inactivity and are torn down on any render failure.

mod process;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cardkit_core::ProtocolError;
use cardkit_core::config::SceneSettings;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

pub use process::ProcessSceneBackend;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("no scene host command configured")]
    NotConfigured,

    #[error("failed to launch scene host: {0}")]
    Launch(#[source] std::io::Error),

    #[error("scene host I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("scene host exited")]
    HostExited,

    #[error("scene protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("scene frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("scene render failed: {0}")]
    Render(String),

    #[error("scene render exceeded {0:?}")]
    Timeout(Duration),

    #[error("unknown scene session {0}")]
    NotFound(String),

    #[error("scene sessions are shut down")]
    ShutDown,
}

/// Opens pages in a scene host.
#[async_trait::async_trait]
pub trait SceneBackend: Send + Sync {
    async fn open_page(&self, session_id: &str) -> Result<Box<dyn ScenePage>, SceneError>;
}

/// One page inside a scene host. Each render call returns encoded image
/// bytes.
#[async_trait::async_trait]
pub trait ScenePage: Send {
    async fn initialize(&mut self, init_script: &str, options: &Value) -> Result<Vec<u8>, SceneError>;
    async fn update(&mut self, options: &Value) -> Result<Vec<u8>, SceneError>;
    async fn close(&mut self) -> Result<(), SceneError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Rendering,
    Closed,
}

struct SceneSession {
    id: String,
    init_script: String,
    page: Box<dyn ScenePage>,
    state: SessionState,
    idle: Option<AbortHandle>,
    /// Bumped on every arm; a timer only fires for the arm that spawned it.
    idle_generation: u64,
}

impl SceneSession {
    async fn teardown(&mut self) {
        if let Some(timer) = self.idle.take() {
            timer.abort();
        }
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        if let Err(e) = self.page.close().await {
            warn!(session_id = %self.id, "scene page close failed: {e}");
        }
    }
}

type SessionMap = Mutex<HashMap<String, Arc<Mutex<SceneSession>>>>;

/// Owner of every live scene session.
pub struct SceneSessions {
    backend: Arc<dyn SceneBackend>,
    sessions: Arc<SessionMap>,
    idle_timeout: Duration,
    render_timeout: Duration,
    closed: std::sync::atomic::AtomicBool,
}

impl SceneSessions {
    pub fn new(backend: Arc<dyn SceneBackend>, settings: &SceneSettings) -> Self {
        Self {
            backend,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            render_timeout: Duration::from_millis(settings.render_timeout_ms),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Get or open the session for `session_id`. A changed init script
    /// marks the session for re-initialization on its next render.
    pub async fn ensure_session(
        &self,
        session_id: &str,
        init_script: &str,
    ) -> Result<SessionState, SceneError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(SceneError::ShutDown);
        }

        let existing = self.sessions.lock().await.get(session_id).cloned();
        if let Some(session) = existing {
            let mut guard = session.lock().await;
            if guard.state != SessionState::Closed {
                if guard.init_script != init_script {
                    guard.init_script = init_script.to_string();
                    guard.state = SessionState::Uninitialized;
                }
                self.arm_idle_timer(&session, &mut guard);
                return Ok(guard.state);
            }
        }

        let page = self.backend.open_page(session_id).await?;
        let session = Arc::new(Mutex::new(SceneSession {
            id: session_id.to_string(),
            init_script: init_script.to_string(),
            page,
            state: SessionState::Uninitialized,
            idle: None,
            idle_generation: 0,
        }));
        {
            let mut guard = session.lock().await;
            self.arm_idle_timer(&session, &mut guard);
        }
        let replaced = self
            .sessions
            .lock()
            .await
            .insert(session_id.to_string(), session);
        if let Some(old) = replaced {
            old.lock().await.teardown().await;
        }
        info!(session_id, "scene session opened");
        Ok(SessionState::Uninitialized)
    }

    /// Render the session's scene. Initializes fully on the first call or
    /// when `force_init` is set, otherwise sends only `options`.
    ///
    /// Any failure closes the session before the error is returned.
    pub async fn render_update(
        &self,
        session_id: &str,
        options: &Value,
        force_init: bool,
    ) -> Result<Vec<u8>, SceneError> {
        let session = self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SceneError::NotFound(session_id.to_string()))?;

        let mut guard = session.lock().await;
        if guard.state == SessionState::Closed {
            return Err(SceneError::NotFound(session_id.to_string()));
        }
        if let Some(timer) = guard.idle.take() {
            timer.abort();
        }

        let initialize = force_init || guard.state == SessionState::Uninitialized;
        guard.state = SessionState::Rendering;
        let script = guard.init_script.clone();
        let render = async {
            if initialize {
                guard.page.initialize(&script, options).await
            } else {
                guard.page.update(options).await
            }
        };
        let outcome = match tokio::time::timeout(self.render_timeout, render).await {
            Ok(result) => result,
            Err(_) => Err(SceneError::Timeout(self.render_timeout)),
        };

        match outcome {
            Ok(frame) => {
                guard.state = SessionState::Ready;
                self.arm_idle_timer(&session, &mut guard);
                debug!(session_id, initialize, bytes = frame.len(), "scene rendered");
                Ok(frame)
            }
            Err(e) => {
                warn!(session_id, "scene render failed, closing session: {e}");
                guard.teardown().await;
                drop(guard);
                self.forget(session_id, &session).await;
                Err(e)
            }
        }
    }

    /// Close one session. Returns whether it existed.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id);
        match removed {
            Some(session) => {
                session.lock().await.teardown().await;
                info!(session_id, "scene session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session and refuse new ones.
    pub async fn shutdown(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        let count = drained.len();
        for (_, session) in drained {
            session.lock().await.teardown().await;
        }
        info!(closed = count, "scene sessions shut down");
    }

    pub async fn session_state(&self, session_id: &str) -> Option<SessionState> {
        let session = self.sessions.lock().await.get(session_id).cloned()?;
        let state = session.lock().await.state;
        Some(state)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn forget(&self, session_id: &str, session: &Arc<Mutex<SceneSession>>) {
        let mut map = self.sessions.lock().await;
        if map.get(session_id).is_some_and(|s| Arc::ptr_eq(s, session)) {
            map.remove(session_id);
        }
    }

    fn arm_idle_timer(&self, session: &Arc<Mutex<SceneSession>>, guard: &mut SceneSession) {
        if let Some(timer) = guard.idle.take() {
            timer.abort();
        }
        guard.idle_generation += 1;
        let generation = guard.idle_generation;
        let sessions: Weak<SessionMap> = Arc::downgrade(&self.sessions);
        let target = Arc::downgrade(session);
        let id = guard.id.clone();
        let timeout = self.idle_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let (Some(sessions), Some(target)) = (sessions.upgrade(), target.upgrade()) else {
                return;
            };
            // Session lock first; no path waits on a session while holding the map.
            let mut session = target.lock().await;
            if session.idle_generation != generation {
                return;
            }
            {
                let mut map = sessions.lock().await;
                if !map.get(&id).is_some_and(|s| Arc::ptr_eq(s, &target)) {
                    return;
                }
                map.remove(&id);
            }
            // Teardown would abort this very task through its own handle.
            session.idle = None;
            session.teardown().await;
            info!(session_id = %id, idle_ms = timeout.as_millis() as u64, "scene session idle, closed");
        });
        guard.idle = Some(handle.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Log {
        opened: usize,
        inits: Vec<String>,
        updates: usize,
        closed: usize,
    }

    struct FakeBackend {
        log: Arc<std::sync::Mutex<Log>>,
        fail_updates: bool,
    }

    struct FakePage {
        log: Arc<std::sync::Mutex<Log>>,
        fail_updates: bool,
    }

    #[async_trait::async_trait]
    impl SceneBackend for FakeBackend {
        async fn open_page(&self, _: &str) -> Result<Box<dyn ScenePage>, SceneError> {
            self.log.lock().unwrap().opened += 1;
            Ok(Box::new(FakePage {
                log: self.log.clone(),
                fail_updates: self.fail_updates,
            }))
        }
    }

    #[async_trait::async_trait]
    impl ScenePage for FakePage {
        async fn initialize(&mut self, script: &str, _: &Value) -> Result<Vec<u8>, SceneError> {
            self.log.lock().unwrap().inits.push(script.to_string());
            Ok(vec![1])
        }

        async fn update(&mut self, _: &Value) -> Result<Vec<u8>, SceneError> {
            if self.fail_updates {
                return Err(SceneError::Render("webgl context lost".into()));
            }
            self.log.lock().unwrap().updates += 1;
            Ok(vec![2])
        }

        async fn close(&mut self) -> Result<(), SceneError> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    fn sessions(fail_updates: bool, idle_ms: u64) -> (SceneSessions, Arc<std::sync::Mutex<Log>>) {
        let log = Arc::new(std::sync::Mutex::new(Log::default()));
        let backend = FakeBackend {
            log: log.clone(),
            fail_updates,
        };
        let settings = SceneSettings {
            command: Vec::new(),
            idle_timeout_ms: idle_ms,
            render_timeout_ms: 1000,
        };
        (SceneSessions::new(Arc::new(backend), &settings), log)
    }

    #[tokio::test]
    async fn test_first_render_initializes_then_updates() {
        let (scenes, log) = sessions(false, 10_000);
        assert_eq!(
            scenes.ensure_session("s1", "init-a").await.unwrap(),
            SessionState::Uninitialized
        );
        assert_eq!(scenes.render_update("s1", &json!({}), false).await.unwrap(), vec![1]);
        assert_eq!(
            scenes.render_update("s1", &json!({"rotation": 0.5}), false).await.unwrap(),
            vec![2]
        );
        assert_eq!(scenes.session_state("s1").await, Some(SessionState::Ready));

        // Forced and script-changed renders initialize again.
        scenes.render_update("s1", &json!({}), true).await.unwrap();
        scenes.ensure_session("s1", "init-b").await.unwrap();
        scenes.render_update("s1", &json!({}), false).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.inits, vec!["init-a", "init-a", "init-b"]);
        assert_eq!(log.updates, 1);
    }

    #[tokio::test]
    async fn test_failure_tears_session_down() {
        let (scenes, log) = sessions(true, 10_000);
        scenes.ensure_session("s1", "init").await.unwrap();
        scenes.render_update("s1", &json!({}), false).await.unwrap();

        let err = scenes.render_update("s1", &json!({}), false).await.unwrap_err();
        assert!(matches!(err, SceneError::Render(_)));
        assert_eq!(log.lock().unwrap().closed, 1);
        assert!(matches!(
            scenes.render_update("s1", &json!({}), false).await,
            Err(SceneError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let (scenes, log) = sessions(false, 50);
        scenes.ensure_session("s1", "init").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(scenes.is_empty().await);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test]
    async fn test_activity_resets_idle_timer() {
        let (scenes, _log) = sessions(false, 150);
        scenes.ensure_session("s1", "init").await.unwrap();
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            scenes.render_update("s1", &json!({}), false).await.unwrap();
        }
        assert_eq!(scenes.session_state("s1").await, Some(SessionState::Ready));
    }

    #[tokio::test]
    async fn test_timer_expiring_mid_render_keeps_session() {
        let (scenes, log) = sessions(false, 100);
        scenes.ensure_session("s1", "init").await.unwrap();
        let session = scenes.sessions.lock().await.get("s1").cloned().unwrap();

        // Hold the session the way an in-flight render does while the timer
        // fires, then finish the way a successful render does.
        let mut guard = session.lock().await;
        guard.state = SessionState::Rendering;
        tokio::time::sleep(Duration::from_millis(250)).await;
        guard.state = SessionState::Ready;
        scenes.arm_idle_timer(&session, &mut guard);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scenes.session_state("s1").await, Some(SessionState::Ready));
        assert_eq!(log.lock().unwrap().closed, 0);
        assert_eq!(scenes.render_update("s1", &json!({}), false).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_close_rearmed_session() {
        let (scenes, log) = sessions(false, 50);
        scenes.ensure_session("s1", "init").await.unwrap();
        let session = scenes.sessions.lock().await.get("s1").cloned().unwrap();

        // Detach the pending timer without aborting it, as if it had already
        // been scheduled when newer activity re-armed the session.
        let mut guard = session.lock().await;
        let _stale = guard.idle.take();
        guard.idle_generation += 1;
        drop(guard);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(scenes.len().await, 1);
        assert_eq!(log.lock().unwrap().closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (scenes, log) = sessions(false, 10_000);
        scenes.ensure_session("a", "init").await.unwrap();
        scenes.ensure_session("b", "init").await.unwrap();
        assert!(scenes.close_session("a").await);
        assert!(!scenes.close_session("a").await);

        scenes.shutdown().await;
        assert!(scenes.is_empty().await);
        assert_eq!(log.lock().unwrap().closed, 2);
        assert!(matches!(
            scenes.ensure_session("c", "init").await,
            Err(SceneError::ShutDown)
        ));
    }
}
