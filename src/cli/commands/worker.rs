use chrono::Utc;
use clap::Subcommand;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::DatabaseManager;
use crate::worker;

#[derive(Subcommand)]
pub enum WorkerCommands {
    #[command(about = "Run the worker loop in the foreground until interrupted")]
    Run,

    #[command(about = "Run a single worker tick and print the summary")]
    Once {
        #[arg(long, help = "Skip the automation rule sweep")]
        no_rules: bool,
    },
}

pub async fn handle(cmd: WorkerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        WorkerCommands::Run => {
            let mut worker_config = config().worker.clone();
            worker_config.enabled = true;
            let Some(handle) = worker::spawn_scheduler(worker_config) else {
                return Ok(());
            };
            tokio::select! {
                result = handle => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Worker interrupted"),
            }
            DatabaseManager::close().await;
            Ok(())
        }
        WorkerCommands::Once { no_rules } => {
            let pool = DatabaseManager::pool().await?;
            let run = worker::run_once(&pool, &config().worker, Utc::now(), !no_rules).await;
            output_success(&output_format, "Worker tick complete", Some(serde_json::to_value(&run)?))
        }
    }
}

pub async fn remind(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::pool().await?;
    let summary = worker::run_reminders(&pool, &config().worker, Utc::now()).await?;
    output_success(
        &output_format,
        &format!("{} reminders created", summary.reminders_created),
        Some(serde_json::to_value(&summary)?),
    )
}
