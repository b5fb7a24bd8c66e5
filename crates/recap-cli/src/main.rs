mod client;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use recap_cron::{GenericTask, ScheduledTask, TaskRegistry};
use recap_gateway::bootstrap::TaskFactoryMap;
use recap_obs::ObsTask;

const DEFAULT_URL: &str = "http://127.0.0.1:6000";

#[derive(Parser)]
#[command(name = "recap", about = "Scheduled capture automation daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon and its HTTP API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the schedules config file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Control the recording task on a running daemon
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Check daemon health
    Health {
        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Start recording now
    Start {
        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Stop recording now
    Stop {
        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
    /// Rewrite the recording start/stop cron pair
    Schedule {
        /// Cron expression that starts the recording
        #[arg(long)]
        start: String,

        /// Cron expression that stops the recording
        #[arg(long)]
        stop: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

/// The closed set of task classes this build can instantiate.
fn task_factories() -> TaskFactoryMap {
    let mut factories: TaskFactoryMap = HashMap::new();
    factories.insert(
        "Task".to_string(),
        Box::new(|| Box::new(GenericTask::new()) as Box<dyn ScheduledTask>),
    );
    factories.insert(
        "ObsTask".to_string(),
        Box::new(|| Box::new(ObsTask::new()) as Box<dyn ScheduledTask>),
    );
    factories
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let _ = dotenvy::dotenv();

                let config_path = match config {
                    Some(path) => PathBuf::from(path),
                    None => recap_config::config_file_path()?,
                };
                let config = recap_config::load_config_from(&config_path)?;

                let registry = Arc::new(TaskRegistry::new());
                recap_gateway::start_server(
                    config,
                    config_path,
                    registry,
                    task_factories(),
                    port,
                )
                .await
            })?;
        }
        Commands::Record { action } => {
            let rt = tokio::runtime::Runtime::new()?;
            match action {
                RecordAction::Start { url } => rt.block_on(client::run_record_start(url))?,
                RecordAction::Stop { url } => rt.block_on(client::run_record_stop(url))?,
                RecordAction::Schedule { start, stop, url } => {
                    rt.block_on(client::run_set_schedule(url, start, stop))?
                }
            }
        }
        Commands::Health { url } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(client::run_health(url))?;
        }
    }

    Ok(())
}
