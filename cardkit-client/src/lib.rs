pub mod banner_check;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod scene;
pub mod spawner;

pub use banner_check::{BannerCheck, BannerCheckError};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use retry::{BackoffPolicy, retry_with_backoff};
pub use scene::{ProcessSceneBackend, SceneBackend, SceneError, ScenePage, SceneSessions, SessionState};
pub use spawner::WorkerHandle;
