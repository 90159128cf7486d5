//! Main entry point for the Stable Diffusion dispatch gateway

use sd_dispatch_gateway::{
    admission::AdmissionController,
    api,
    backend::WebUiBackend,
    config::Settings,
    jobs::JobStore,
    queue::JobQueue,
    session::SessionStore,
    AppState,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration before logging so the format setting applies
    let settings = Settings::load()?;
    settings.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));

    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting Stable Diffusion dispatch gateway");
    info!(
        "Loaded configuration: server={}:{}, downstream={}",
        settings.server.host, settings.server.port, settings.downstream.base_url
    );

    let backend = Arc::new(WebUiBackend::new(&settings.downstream)?);
    let sessions = Arc::new(SessionStore::new(
        settings.storage.sessions_file.clone(),
        settings.storage.presets_file.clone(),
    ));
    let jobs = Arc::new(JobStore::new());
    let admission = Arc::new(AdmissionController::new(
        settings.admission.cooldown_secs,
        settings.admission.privileged_callers.clone(),
    ));
    let queue = JobQueue::new(
        backend.clone(),
        jobs.clone(),
        admission.clone(),
        settings.queue.max_pending,
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let result_ttl = chrono::Duration::seconds(settings.queue.result_ttl_secs as i64);

    let app_state = Arc::new(AppState {
        settings: Arc::new(RwLock::new(settings)),
        sessions,
        jobs,
        admission,
        queue,
        backend,
        positions: DashMap::new(),
    });

    // Expire terminal jobs and abandoned position receivers so long-running
    // deployments don't accumulate finished state.
    {
        let state = app_state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                state
                    .jobs
                    .prune_terminal_before(chrono::Utc::now() - result_ttl);
                state.positions.retain(|job_id, _| {
                    state
                        .jobs
                        .status(*job_id)
                        .map_or(false, |status| !status.status.is_terminal())
                });
            }
        });
    }

    let app = api::routes::create_router(app_state).await;

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
