use std::sync::Arc;

use cardkit_core::Settings;
use cardkit_render::Renderer;
use cardkit_worker::{WorkerError, WorkerServer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Resolve settings before tracing so the configured level applies.
    let settings = match Settings::for_worker() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("cardkit-worker: failed to load settings: {e}");
            std::process::exit(1);
        }
    };

    // stdout carries protocol frames; logs go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match serve(settings).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("worker failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn serve(settings: Settings) -> Result<i32, WorkerError> {
    let worker_settings = settings.worker.clone();
    let renderer = tokio::task::spawn_blocking(move || Renderer::new(&settings)).await??;
    let components: Vec<&str> = renderer.registry().names().collect();
    info!(?components, "renderer ready");

    let server = WorkerServer::new(
        worker_settings,
        Arc::new(renderer),
        tokio::io::stdin(),
        tokio::io::stdout(),
    );
    let reason = server.run().await?;
    info!(?reason, "worker exiting");
    Ok(reason.code())
}
