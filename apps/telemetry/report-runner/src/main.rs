//! Report Runner
//!
//! Operator CLI over the telemetry report store: generate a report once,
//! apply retention, trigger a named job or run the scheduler standalone.

use axum_helpers::shutdown_signal;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use database::common::RetryConfig;
use database::postgres;
use domain_analytics::{InMemoryUserDirectory, UserDirectory};
use domain_events::{PgEventStore, SystemClock};
use domain_reports::{PgReportRepository, ReportFormat, ReportStatus, ReportType};
use eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

mod config;
mod runner;

use config::Config;
use runner::{GenerateArgs, Runner};

#[derive(Parser)]
#[command(name = "report-runner")]
#[command(about = "Generate telemetry reports and run the report jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one report and wait for it to finish
    Generate {
        /// daily, weekly, monthly or custom
        #[arg(short = 't', long = "type", default_value = "daily")]
        report_type: ReportType,

        /// Window start (RFC 3339). Defaults to the last full period of the type.
        #[arg(long, requires = "end")]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339)
        #[arg(long, requires = "start")]
        end: Option<DateTime<Utc>>,

        /// Scope the report to one user
        #[arg(short, long)]
        user: Option<Uuid>,

        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: ReportFormat,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete reports and events older than the retention windows
    Cleanup,

    /// Trigger one registered job now (e.g. engagement-refresh)
    Run { job: String },

    /// Run the cron scheduler until SIGINT/SIGTERM
    Schedule,

    /// Show registered jobs and the most recent reports
    Status {
        #[arg(short, long, default_value_t = 10)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config.environment);
    observability::init_metrics()?;

    info!("Connecting to database...");
    let db = postgres::connect_with_retry(&config.database, RetryConfig::default())
        .await
        .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;
    postgres::run_migrations::<migration::Migrator>(&db).await?;

    let directory: Arc<dyn UserDirectory> = Arc::new(InMemoryUserDirectory::new());
    warn!("User directory is in memory: new-user counts read 0 and engagement scores are lost on exit");

    let runner = Runner::build(
        Arc::new(PgEventStore::new(db.clone())),
        Arc::new(PgReportRepository::new(db)),
        directory,
        Arc::new(config.recipients.clone()),
        config.reports.clone(),
        SystemClock::shared(),
    )?;

    match cli.command {
        Commands::Generate {
            report_type,
            start,
            end,
            user,
            format,
            name,
        } => {
            let report = runner
                .generate(GenerateArgs {
                    report_type,
                    start,
                    end,
                    user,
                    format,
                    name,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.status == ReportStatus::Failed {
                eyre::bail!(
                    "report {} failed: {}",
                    report.id,
                    report.error_message.unwrap_or_default()
                );
            }
        }

        Commands::Cleanup => {
            let summary = runner.cleanup().await?;
            info!(
                reports = summary.reports_deleted,
                events = summary.events_deleted,
                "Retention cleanup complete"
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Run { job } => {
            let run = runner.run_job(&job).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }

        Commands::Schedule => {
            let abandoned = runner.fail_abandoned().await?;
            if abandoned > 0 {
                warn!(abandoned, "Failed reports left in generating by an earlier process");
            }
            runner.scheduler().start().await?;
            info!(jobs = ?runner.scheduler().job_names(), "Report scheduler running");
            shutdown_signal().await;
            runner.scheduler().shutdown().await?;
        }

        Commands::Status { limit } => {
            let status = runner.status(limit).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
