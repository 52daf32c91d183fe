use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use rand::Rng;
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;

use swarmr::admission::AdmissionController;
use swarmr::config::SwarmConfig;
use swarmr::evaluate::DelegatedEvaluator;
use swarmr::executor::TaskExecutor;
use swarmr::monitor::{HealthProbe, ResourceMonitor};
use swarmr::provider::{AnthropicConfig, AnthropicProvider, CompletionProvider};
use swarmr::select::TaskSelector;
use swarmr::sink::JsonlSink;
use swarmr::sprint::{SprintOrchestrator, SprintPlan};
use swarmr::task::{Catalog, StatsBook};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swarmr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("swarmr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    let mut config = SwarmConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // CLI overrides
    config.sprint.total_tasks = cli.effective_tasks(config.sprint.total_tasks);
    if let Some(kind) = cli.kind {
        config.sprint.kind = kind.into();
    }
    if let Some(budget) = cli.budget {
        config.budget.limit_usd = budget;
    }
    if let Some(seed) = cli.seed {
        config.sprint.seed = seed;
    }

    config.validate().context("Invalid configuration")?;

    let stats = run(&config).await?;

    println!(
        "{} {} completed, {} failed, {} paused",
        "Sprint finished:".green().bold(),
        stats.completed,
        stats.failed,
        stats.paused
    );
    println!(
        "  {} tokens, {}",
        stats.tokens_used,
        format!("${:.2}", stats.cost_accumulated).yellow()
    );

    // A budget-triggered early stop is a normal finish; only startup
    // failures exit non-zero, via the ? returns above.
    Ok(())
}

async fn run(config: &SwarmConfig) -> Result<swarmr::task::SprintStats> {
    let kind = config.sprint.kind;
    let catalog = Arc::new(Catalog::for_sprint_kind(kind));

    let provider = Arc::new(
        AnthropicProvider::new(AnthropicConfig {
            model: effective_model(config),
            timeout: Duration::from_millis(config.provider.timeout_ms),
        })
        .map_err(|e| eyre::eyre!("provider startup failed: {}", e))?,
    );

    let cancel = CancellationToken::new();
    let monitor = Arc::new(ResourceMonitor::new(Duration::from_millis(
        config.monitor.sample_interval_ms,
    )));
    Arc::clone(&monitor).spawn_refresher(cancel.child_token());

    let ceiling = if config.concurrency.max_concurrent > 0 {
        config.concurrency.max_concurrent
    } else {
        monitor.concurrency_ceiling()
    };
    info!("concurrency ceiling: {}", ceiling);

    let stats = Arc::new(StatsBook::new());
    let admission = Arc::new(
        AdmissionController::new(
            ceiling,
            config.budget_ceiling(),
            Arc::clone(&stats),
            Arc::clone(&monitor) as Arc<dyn HealthProbe>,
        )
        .with_cancel(cancel.clone()),
    );

    let seed = if config.sprint.seed != 0 {
        config.sprint.seed
    } else {
        rand::rng().random()
    };
    let selector = Arc::new(TaskSelector::new(Arc::clone(&catalog), seed));

    let sink = Arc::new(
        JsonlSink::new(&config.output.artifacts_path)
            .map_err(|e| eyre::eyre!("artifact sink startup failed: {}", e))?,
    );

    let evaluator = Arc::new(DelegatedEvaluator::new(
        Arc::clone(&provider) as Arc<dyn CompletionProvider>,
        effective_model(config),
    ));

    let executor = Arc::new(TaskExecutor::new(
        provider,
        Arc::clone(&admission),
        Arc::clone(&stats),
        sink,
        config.retry_policy(),
        config.generation_settings(),
    ));

    let summary_path = config.output.summary_dir.join(format!(
        "sprint-{}.json",
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
    ));

    let plan = SprintPlan::new(config.sprint.total_tasks, kind)
        .with_checkpoint_interval(config.sprint.checkpoint_interval)
        .with_summary_path(summary_path);

    let orchestrator = SprintOrchestrator::new(
        executor,
        selector,
        admission,
        evaluator,
        stats,
        cancel.clone(),
        plan,
    );

    // Ctrl-C stops new dispatch; in-flight tasks run to completion
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining sprint");
            ctrl_c_cancel.cancel();
        }
    });

    let stats = orchestrator.run_sprint().await;
    cancel.cancel();

    Ok(stats)
}

fn effective_model(config: &SwarmConfig) -> String {
    if config.provider.model.is_empty() {
        // AnthropicConfig::default() carries the provider default; reuse it
        AnthropicConfig::default().model
    } else {
        config.provider.model.clone()
    }
}
