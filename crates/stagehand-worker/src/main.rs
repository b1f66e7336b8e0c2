use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use stagehand_core::StagehandConfig;
use stagehand_scheduler::{
    shared::{initialize, load_snapshot},
    ScheduleStore, SchedulePlan, SqliteStore,
};
use stagehand_worker::{CommandExecutor, DriverOptions, WorkerDriver};
use tracing::{info, warn};

/// Staged distributed task scheduler.
#[derive(Debug, Parser)]
#[command(name = "stagehand", version)]
struct Cli {
    /// Config file (default: $STAGEHAND_CONFIG, then ~/.stagehand/stagehand.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the schedule from a plan file and store it.
    Init {
        plan: PathBuf,
        /// Replace an existing schedule, discarding its progress.
        #[arg(long)]
        force: bool,
    },
    /// Print progress of the stored schedule.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Pull and execute tasks until the schedule is complete.
    Work {
        /// Concurrent drivers in this process.
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Seed the store from this plan if no schedule exists yet.
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Delete the stored schedule.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stagehand=info,stagehand_worker=info,stagehand_scheduler=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > STAGEHAND_CONFIG env > ~/.stagehand/stagehand.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("STAGEHAND_CONFIG").ok());
    let config = StagehandConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        StagehandConfig::default()
    });

    let store: Arc<dyn ScheduleStore> = Arc::new(SqliteStore::open(&config.store)?);
    let key = config.store.key.clone();

    match cli.command {
        Command::Init { plan, force } => {
            let coordinator = SchedulePlan::load(&plan)?
                .build(config.schedule.min_reassign_delay_secs)?;
            if initialize(store.as_ref(), &key, &coordinator, force)? {
                println!(
                    "initialized {key:?}: {} stages, {} tasks",
                    coordinator.stages().len(),
                    coordinator.individual_tasks().count()
                );
            } else {
                bail!("schedule {key:?} already exists; pass --force to replace it");
            }
        }

        Command::Status { json } => {
            let coordinator = load_snapshot(store.as_ref(), &key)?
                .with_context(|| format!("no schedule stored under {key:?}"))?;
            let summary = coordinator.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for (i, stage) in summary.stages.iter().enumerate() {
                    println!(
                        "stage {i}: {}/{} complete, {} in flight, {} waiting",
                        stage.completed,
                        stage.total(),
                        stage.started,
                        stage.unstarted
                    );
                }
                println!(
                    "overall: {:.1}% complete, longest task {:.1}s{}",
                    summary.proportion_complete * 100.0,
                    summary.longest_duration_secs,
                    if summary.complete { " (done)" } else { "" }
                );
            }
        }

        Command::Work { workers, plan } => {
            let Some(program) = config.worker.command.clone() else {
                bail!("worker.command is not configured");
            };
            let initial = plan
                .map(|p| {
                    SchedulePlan::load(&p)
                        .and_then(|plan| plan.build(config.schedule.min_reassign_delay_secs))
                })
                .transpose()?;
            let options = DriverOptions::from(&config.worker);

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, finishing up");
                    let _ = shutdown_tx.send(true);
                }
            });

            let mut handles = Vec::with_capacity(workers.max(1));
            for _ in 0..workers.max(1) {
                let executor = CommandExecutor::new(program.clone(), config.worker.args.clone());
                let mut driver =
                    WorkerDriver::new(Arc::clone(&store), key.clone(), executor, options.clone());
                if let Some(ref initial) = initial {
                    driver = driver.with_initial(initial.clone());
                }
                info!(worker_id = driver.worker_id(), "spawning worker");
                let rx = shutdown_rx.clone();
                handles.push(tokio::spawn(async move { driver.run(rx).await }));
            }

            let mut executed = 0;
            let mut failed = 0;
            let mut all_complete = false;
            for handle in handles {
                let report = handle.await??;
                executed += report.executed;
                failed += report.failed;
                all_complete |= report.all_complete;
            }
            println!(
                "executed {executed} tasks ({failed} failed){}",
                if all_complete { "; schedule complete" } else { "" }
            );
        }

        Command::Reset => {
            if store.remove(&key)? {
                println!("removed schedule {key:?}");
            } else {
                println!("no schedule stored under {key:?}");
            }
        }
    }

    Ok(())
}
