use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cardkit_core::props::stringify_unsafe_integers;
use cardkit_core::{RenderRequest, RenderResult, Scaling, Settings};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::banner_check::BannerCheck;
use crate::error::DispatchError;
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::spawner::{WorkerHandle, resolve_worker_path};

const BANNER_PROP: &str = "banner_url";

/// Caller-side entry point: owns the worker pool and retries renders.
///
/// Each slot holds at most one worker and serializes its requests; the
/// semaphore bounds how many callers may be queued or in flight.
pub struct Dispatcher {
    settings: Settings,
    worker_path: PathBuf,
    slots: Vec<Mutex<Option<WorkerHandle>>>,
    permits: Arc<Semaphore>,
    next_slot: AtomicUsize,
    policy: BackoffPolicy,
    banner_check: BannerCheck,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Result<Self, DispatchError> {
        let worker_path = resolve_worker_path(settings.dispatcher.worker_path.as_deref())?;
        let pool_size = settings.dispatcher.pool_size.max(1);
        let permits = pool_size * settings.dispatcher.queue_depth.max(1);
        let banner_check = BannerCheck::new(&settings.dispatcher)
            .map_err(|e| DispatchError::StartupFailed(format!("banner client: {e}")))?;

        info!(
            worker = %worker_path.display(),
            pool_size,
            permits,
            "dispatcher ready"
        );
        Ok(Self {
            policy: BackoffPolicy::from_settings(&settings.dispatcher),
            slots: (0..pool_size).map(|_| Mutex::new(None)).collect(),
            permits: Arc::new(Semaphore::new(permits)),
            next_slot: AtomicUsize::new(0),
            banner_check,
            closed: AtomicBool::new(false),
            worker_path,
            settings,
        })
    }

    /// Render `component` with `props`, retrying transient failures on a
    /// fresh worker.
    ///
    /// A `banner_url` prop is verified first and dropped if unreachable.
    pub async fn render(
        &self,
        component: &str,
        mut props: Value,
        config: Value,
        scaling: Scaling,
    ) -> Result<RenderResult, DispatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;

        stringify_unsafe_integers(&mut props);
        self.prevalidate_banner(&mut props).await;

        let request = RenderRequest::new(component, props, config, scaling);
        let slot = self.pick_slot();
        debug!(request_id = %request.id, component, slot, "dispatching render");

        let request = &request;
        retry_with_backoff(
            &self.policy,
            "render",
            DispatchError::is_retryable,
            move |attempt| self.attempt(slot, request, attempt),
        )
        .await
    }

    /// Stop every worker and refuse new renders.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.permits.close();
        for slot in &self.slots {
            if let Some(worker) = slot.lock().await.take() {
                worker.shutdown().await;
            }
        }
        info!("dispatcher shut down");
    }

    async fn attempt(
        &self,
        slot: usize,
        request: &RenderRequest,
        attempt: u32,
    ) -> Result<RenderResult, DispatchError> {
        let Some(slot) = self.slots.get(slot) else {
            return Err(DispatchError::Closed);
        };
        let mut guard = slot.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }

        let reusable = match guard.as_mut() {
            Some(worker) => worker.is_reusable(),
            None => false,
        };
        let mut worker = match guard.take() {
            Some(worker) if reusable => worker,
            stale => {
                if let Some(old) = stale {
                    debug!(worker_pid = old.pid(), "retiring idle worker");
                }
                WorkerHandle::spawn(&self.worker_path, &self.settings).await?
            }
        };

        let result = worker
            .generate(request, self.settings.dispatcher.request_timeout())
            .await;
        match &result {
            Ok(rendered) => {
                info!(
                    request_id = %request.id,
                    component = %request.component,
                    worker_pid = worker.pid(),
                    attempt,
                    content_type = %rendered.content_type,
                    bytes = rendered.data.len(),
                    "render complete"
                );
                *guard = Some(worker);
            }
            Err(e) if e.keeps_worker() => *guard = Some(worker),
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    worker_pid = worker.pid(),
                    attempt,
                    "discarding worker after failure: {e}"
                );
            }
        }
        result
    }

    async fn prevalidate_banner(&self, props: &mut Value) {
        let Some(map) = props.as_object_mut() else {
            return;
        };
        let url = match map.get(BANNER_PROP) {
            Some(Value::String(url)) if !url.is_empty() => url.clone(),
            Some(_) => {
                map.remove(BANNER_PROP);
                return;
            }
            None => return,
        };
        if let Err(e) = self.banner_check.verify(&url).await {
            warn!(banner_outcome = "dropped", reason = %e, "banner failed pre-check");
            map.remove(BANNER_PROP);
        }
    }

    fn pick_slot(&self) -> usize {
        if let Some(idle) = self.slots.iter().position(|slot| slot.try_lock().is_ok()) {
            return idle;
        }
        self.next_slot.fetch_add(1, Ordering::Relaxed) % self.slots.len()
    }
}
