//! Telemetry API
//!
//! Serves ingestion, sessions, dashboards and reports over HTTP, and runs
//! the ingestion flush loop and the report scheduler in-process.

use axum::routing::get;
use axum_helpers::{ShutdownCoordinator, create_router, health_router, serve};
use core_config::tracing::{init_tracing, install_color_eyre};
use database::common::RetryConfig;
use database::postgres::{self, DatabaseConnection};
use domain_analytics::{InMemoryUserDirectory, UserDirectory};
use domain_events::{
    EventRepository, MemoryEventStore, PgEventStore, SessionRepository, SystemClock,
};
use domain_reports::{InMemoryReportRepository, PgReportRepository, ReportRepository};
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod openapi;
mod pipeline;
mod ready;

use config::Config;
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);
    observability::init_metrics()?;

    let recipients = Arc::new(config.recipients.clone());

    match config.database.clone() {
        Some(database) => {
            info!("Connecting to PostgreSQL");
            let db = postgres::connect_with_retry(&database, RetryConfig::default())
                .await
                .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;
            postgres::run_migrations::<migration::Migrator>(&db).await?;

            let pipeline = Pipeline::build(
                Arc::new(PgEventStore::new(db.clone())),
                Arc::new(PgReportRepository::new(db.clone())),
                user_directory(),
                recipients,
                &config,
                SystemClock::shared(),
            )?;
            run(pipeline, &config, Some(db)).await
        }
        None => {
            warn!("DATABASE_URL is not set; events and reports live in memory only");
            let pipeline = Pipeline::build(
                Arc::new(MemoryEventStore::new()),
                Arc::new(InMemoryReportRepository::new()),
                user_directory(),
                recipients,
                &config,
                SystemClock::shared(),
            )?;
            run(pipeline, &config, None).await
        }
    }
}

/// Accounts live outside the pipeline and no account service is wired in yet
fn user_directory() -> Arc<dyn UserDirectory> {
    warn!(
        "User directory is in memory: new-user counts read 0 and engagement scores are lost on restart"
    );
    Arc::new(InMemoryUserDirectory::new())
}

async fn run<E, R>(
    pipeline: Pipeline<E, R>,
    config: &Config,
    db: Option<DatabaseConnection>,
) -> eyre::Result<()>
where
    E: EventRepository + SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    let shutdown = ShutdownCoordinator::new();

    // Reports a crashed process left in `generating` would otherwise never finish
    pipeline
        .generator
        .fail_abandoned(config.reports.generation_timeout)
        .await?;

    let flush_loop = tokio::spawn(pipeline.ingestion.clone().run(shutdown.subscribe()));
    pipeline.scheduler.start().await?;

    let app = create_router::<openapi::ApiDoc>(pipeline.routes(), &config.server)?
        .merge(health_router(config.app))
        .merge(ready::router(db.clone()))
        .route("/metrics", get(observability::metrics_handler));

    info!(
        name = config.app.name,
        version = config.app.version,
        "Starting telemetry API"
    );
    let served = serve(app, &config.server, shutdown.clone().wait_for_signal()).await;
    // A bind failure returns before any signal; stop the background loops either way
    shutdown.trigger();

    if let Err(e) = pipeline.scheduler.shutdown().await {
        error!(error = %e, "Report scheduler did not stop cleanly");
    }

    let interrupted = pipeline.generator.drain(config.server.shutdown_timeout).await;
    if interrupted > 0 {
        warn!(interrupted, "Report generation interrupted by shutdown");
    }

    // The flush loop drains the ingestion queue before returning
    match tokio::time::timeout(config.server.shutdown_timeout, flush_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Ingestion flush loop panicked"),
        Err(_) => warn!(
            queued = pipeline.ingestion.queued(),
            "Ingestion queue not drained before the shutdown timeout"
        ),
    }

    if let Some(db) = db {
        match db.close().await {
            Ok(()) => info!("PostgreSQL connection closed"),
            Err(e) => error!(error = %e, "Error closing PostgreSQL"),
        }
    }

    served?;
    info!("Telemetry API shutdown complete");
    Ok(())
}
