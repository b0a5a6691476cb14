//! Activities regime lifecycle worker.
//!
//! Runs the daily pipelines, consumes the job queue and serves health probes.

use std::sync::Arc;

use anyhow::Result;
use regime_lifecycle::{
    api,
    clients::{PrisonApiClient, PrisonerSearchClient},
    config,
    db::Database,
    events::EventPublisher,
    jobs::{JobCoordinator, QueueWorker, SiteSteps, StepDeps},
    monitoring::{MonitoringSink, TracingMonitor},
    movements::MovementHandler,
    scheduler::DailySchedulerWorker,
    state::AppState,
    unit_of_work::UnitOfWork,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to REGIME_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting lifecycle worker");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let db = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return Err(e.into());
        }
    };

    if config.dev_mode {
        info!("Running database migrations (dev mode)");
        if let Err(e) = db.run_migrations().await {
            error!(error = %e, "Failed to run migrations");
            return Err(e.into());
        }
    }

    let jobs = Arc::new(db.job_store());
    let queue = Arc::new(db.job_queue(config.worker.lease));
    let sites = Arc::new(db.site_config_store());
    let monitor: Arc<dyn MonitoringSink> = Arc::new(TracingMonitor);

    let work = UnitOfWork::new(
        Arc::new(db.lifecycle_store()),
        EventPublisher::new(Arc::new(db.outbox())),
    );
    let deps = StepDeps {
        work: work.clone(),
        prisoners: Arc::new(PrisonerSearchClient::new(&config.prisoner_search_url)?),
        movements: Arc::new(PrisonApiClient::new(&config.prison_api_url)?),
        monitor: monitor.clone(),
    };

    let coordinator = Arc::new(JobCoordinator::new(
        jobs.clone(),
        queue.clone(),
        sites.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queue_worker = QueueWorker::new(
        queue.clone(),
        coordinator.clone(),
        Arc::new(SiteSteps::new(deps)),
        sites,
        Arc::new(MovementHandler::new(work)),
        monitor,
        config.worker.clone(),
    );
    let queue_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            queue_worker.run(shutdown_rx).await;
        }
    });

    let scheduler = DailySchedulerWorker::new(coordinator, jobs, config.schedule.clone());
    let scheduler_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            scheduler.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(db.clone(), db.job_queue(config.worker.lease));
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, queue_handle).await {
        warn!(error = %e, "Queue worker did not shut down in time");
    }

    if let Err(e) = tokio::time::timeout(shutdown_timeout, scheduler_handle).await {
        warn!(error = %e, "Scheduler did not shut down in time");
    }

    info!("Lifecycle worker shutdown complete");
    Ok(())
}
