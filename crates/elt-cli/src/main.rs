mod commands;
mod config;
mod exec;
mod registry;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::parse_streams;
use config::Config;
use elt_core::DestinationSyncMode;
use elt_orchestrator::lineage::{HttpLineageSink, LineageSink, NullLineageSink};
use elt_scheduler::{PgHistoryStore, Scheduler};
use registry::ConnectorRegistry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "elt")]
#[command(about = "ELT sync engine operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single sync directly against the orchestrator, bypassing the
    /// scheduler's job bookkeeping.
    Sync {
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        source_name: String,
        #[arg(long)]
        streams: String,
        #[arg(long, default_value = "full_refresh")]
        mode: String,
        #[arg(long, default_value = "append")]
        destination_mode: String,
        #[arg(long)]
        natural_key: Option<String>,
    },

    /// One-off sync jobs run through the scheduler.
    Job {
        #[command(subcommand)]
        cmd: JobCmd,
    },

    /// Cron-scheduled recurring syncs.
    Schedule {
        #[command(subcommand)]
        cmd: ScheduleCmd,
    },

    /// Replication state inspection and maintenance.
    State {
        #[command(subcommand)]
        cmd: StateCmd,
    },
}

#[derive(Subcommand)]
enum JobCmd {
    Run { #[arg(long)] source_id: String, #[arg(long)] source_name: String, #[arg(long)] streams: String, #[arg(long, default_value = "full_refresh")] mode: String },
    Cancel { job_id: String },
    Show { job_id: String },
    List { #[arg(long)] source_id: Option<String>, #[arg(long)] status: Option<String>, #[arg(long)] limit: Option<usize> },
    History { #[arg(long)] source_id: Option<String>, #[arg(long, default_value_t = 50)] limit: usize },
    Stats,
}

#[derive(Subcommand)]
enum ScheduleCmd {
    Create { #[arg(long)] source_id: String, #[arg(long)] source_name: String, #[arg(long)] streams: String, #[arg(long, default_value = "incremental")] mode: String, #[arg(long)] cron: String },
    Update { schedule_id: String, #[arg(long)] enabled: Option<bool>, #[arg(long)] cron: Option<String>, #[arg(long)] streams: Option<String> },
    Delete { schedule_id: String },
    Show { schedule_id: String },
    List { #[arg(long)] source_id: Option<String> },
    Run { schedule_id: String },
}

#[derive(Subcommand)]
enum StateCmd {
    Show { source_id: String },
    List,
    Summary,
    Reset { source_id: String, #[arg(long)] stream: Option<String> },
    Delete { source_id: String },
    Export { source_id: String },
    Import { source_id: String, #[arg(long)] file: std::path::PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = match &config.database_url {
        Some(url) => Some(elt_db::connect(url).await?),
        None => None,
    };
    let state_store: Arc<dyn elt_db::state_store::StateStore> = Arc::from(
        elt_db::open_state_store(
            config.database_url.as_deref().unwrap_or(""),
            config.working_dir.join("state"),
        )
        .await?,
    );
    let lineage: Arc<dyn LineageSink> = match &config.lineage_endpoint {
        Some(endpoint) => Arc::new(HttpLineageSink::new(endpoint.clone())?),
        None => Arc::new(NullLineageSink),
    };

    let mut connector_registry = ConnectorRegistry::new(config.working_dir.clone(), config.connector_timeout);
    connector_registry.load_file(&config.connector_registry_path)?;
    let connector_registry = Arc::new(connector_registry);

    match cli.cmd {
        Commands::Sync { source_id, source_name, streams, mode, destination_mode, natural_key } => {
            let pool = pool.clone().ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for `sync`"))?;
            let sync_mode = commands::job::parse_sync_mode(&mode)?;
            let defaults = exec::ExecDefaults {
                destination_sync_mode: parse_destination_mode(&destination_mode)?,
                natural_key,
                batch_size: config.default_batch_size,
                connector_timeout: config.connector_timeout,
            };
            commands::sync::run(&connector_registry, pool, state_store, lineage, &source_id, &source_name, parse_streams(&streams), sync_mode, defaults).await?;
        }

        Commands::Job { cmd } => {
            let scheduler = build_scheduler(&config, &pool, state_store.clone(), lineage.clone(), connector_registry.clone()).await?;
            match cmd {
                JobCmd::Run { source_id, source_name, streams, mode } => {
                    let sync_mode = commands::job::parse_sync_mode(&mode)?;
                    commands::job::run(&scheduler, &source_id, &source_name, parse_streams(&streams), sync_mode).await?;
                }
                JobCmd::Cancel { job_id } => commands::job::cancel(&scheduler, &job_id).await?,
                JobCmd::Show { job_id } => commands::job::show(&scheduler, &job_id).await?,
                JobCmd::List { source_id, status, limit } => commands::job::list(&scheduler, source_id.as_deref(), status.as_deref(), limit).await?,
                JobCmd::History { source_id, limit } => commands::job::history(&scheduler, source_id.as_deref(), limit).await?,
                JobCmd::Stats => commands::job::stats(&scheduler).await?,
            }
        }

        Commands::Schedule { cmd } => {
            let scheduler = build_scheduler(&config, &pool, state_store.clone(), lineage.clone(), connector_registry.clone()).await?;
            match cmd {
                ScheduleCmd::Create { source_id, source_name, streams, mode, cron } => {
                    let sync_mode = commands::job::parse_sync_mode(&mode)?;
                    commands::schedule::create(&scheduler, &source_id, &source_name, parse_streams(&streams), sync_mode, &cron).await?;
                }
                ScheduleCmd::Update { schedule_id, enabled, cron, streams } => {
                    commands::schedule::update(&scheduler, &schedule_id, enabled, cron.as_deref(), streams.map(|s| parse_streams(&s))).await?;
                }
                ScheduleCmd::Delete { schedule_id } => commands::schedule::delete(&scheduler, &schedule_id).await?,
                ScheduleCmd::Show { schedule_id } => commands::schedule::show(&scheduler, &schedule_id).await?,
                ScheduleCmd::List { source_id } => commands::schedule::list(&scheduler, source_id.as_deref()).await?,
                ScheduleCmd::Run { schedule_id } => commands::schedule::run(&scheduler, &schedule_id).await?,
            }
        }

        Commands::State { cmd } => match cmd {
            StateCmd::Show { source_id } => commands::state::show(state_store.as_ref(), &source_id).await?,
            StateCmd::List => commands::state::list(state_store.as_ref()).await?,
            StateCmd::Summary => commands::state::summary(state_store.as_ref()).await?,
            StateCmd::Reset { source_id, stream } => commands::state::reset(state_store.as_ref(), &source_id, stream.as_deref()).await?,
            StateCmd::Delete { source_id } => commands::state::delete(state_store.as_ref(), &source_id).await?,
            StateCmd::Export { source_id } => commands::state::export(state_store.as_ref(), &source_id).await?,
            StateCmd::Import { source_id, file } => commands::state::import(state_store.as_ref(), &source_id, &file).await?,
        },
    }

    Ok(())
}

fn parse_destination_mode(mode: &str) -> Result<DestinationSyncMode> {
    match mode.trim().to_lowercase().as_str() {
        "append" => Ok(DestinationSyncMode::Append),
        "overwrite" => Ok(DestinationSyncMode::Overwrite),
        "append_dedup" | "append-dedup" => Ok(DestinationSyncMode::AppendDedup),
        other => Err(anyhow::anyhow!("invalid --destination-mode '{other}'")),
    }
}

/// Builds a scheduler wired against the real orchestrator (§9). `pool` is
/// required here (unlike `sync`, which can run statelessly against a file
/// state store) because durable job history writes through Postgres.
async fn build_scheduler(
    config: &Config,
    pool: &Option<sqlx::PgPool>,
    state_store: Arc<dyn elt_db::state_store::StateStore>,
    lineage: Arc<dyn LineageSink>,
    connector_registry: Arc<ConnectorRegistry>,
) -> Result<Scheduler> {
    let pool = pool.clone().ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for job/schedule commands"))?;

    let defaults = exec::ExecDefaults {
        destination_sync_mode: DestinationSyncMode::Append,
        natural_key: None,
        batch_size: config.default_batch_size,
        connector_timeout: config.connector_timeout,
    };
    let executor = exec::build_executor(connector_registry, pool.clone(), state_store, lineage, defaults);
    let history = Arc::new(PgHistoryStore::new(pool));
    Ok(Scheduler::with_history_store(config.max_concurrent_jobs, executor, history))
}
