use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use qb_common::{EnvConfig, Settings};
use qb_orchestrator::{Orchestrator, ProgressSink, ScheduledJob, Scheduler, SelectiveScope, TaskCallbacks, TaskRunner};
use qb_repo::Repository;
use qb_rules::RulesCache;
use qb_scraper::{ChromeSessionAcquirer, Scraper};

/// The marketplace's own SPA, used only to harvest a session token; never
/// scraped for content.
const SPA_URL: &str = "https://buscador.mercadopublico.cl/";
const API_HOST: &str = "api.buscador.mercadopublico.cl";
const BASE_API: &str = "https://api.buscador.mercadopublico.cl";

const SETTINGS_FILE: &str = "settings.json";
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "quick-buy-monitor";

#[derive(Parser)]
#[command(name = "qb-app", about = "Quick-purchase tender monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the listing window, upsert, recompute scores, enrich candidates.
    Harvest {
        #[arg(long)]
        date_from: NaiveDate,
        #[arg(long)]
        date_to: NaiveDate,
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Refresh the rules cache and rescore every tender.
    Recompute,
    /// Re-crawl active candidates and/or refresh followed/bid tenders.
    Update {
        #[arg(long, value_delimiter = ',', default_values_t = vec!["candidates".to_string(), "follow".to_string(), "bids".to_string()])]
        scope: Vec<String>,
    },
    /// Close expired tenders locally and sweep records past retention.
    Sweep,
    /// Run the wall-clock scheduler forever, dispatching auto-extract and
    /// auto-update jobs per `settings.json`.
    Serve,
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    std::fs::create_dir_all(LOG_DIR).ok();
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.and(std::io::stderr))
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing();
    info!("quick-purchase tender monitor starting");

    let cli = Cli::parse();
    let env = EnvConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&env.database_url)
        .await
        .context("failed to connect to database")?;
    qb_repo::run_migrations(&pool).await?;

    let repo = Repository::new(pool);
    let rules_cache = Arc::new(RulesCache::new());
    rules_cache.refresh(&repo).await.context("initial rules cache refresh failed")?;

    let acquirer = ChromeSessionAcquirer::new(SPA_URL, API_HOST, env.headless);
    let scraper = Arc::new(Scraper::new(BASE_API, Box::new(acquirer), env.mercadopublico_api_key.clone()));

    let orchestrator = Arc::new(Orchestrator::new(repo, rules_cache, scraper));
    let task_runner = Arc::new(TaskRunner::new());

    match cli.command {
        Command::Harvest { date_from, date_to, max_pages } => {
            run_blocking(&task_runner, {
                let orchestrator = orchestrator.clone();
                move |sink| {
                    Box::pin(async move { orchestrator.full_harvest(date_from, date_to, max_pages, &sink).await })
                }
            })
            .await?;
        }
        Command::Recompute => {
            run_blocking(&task_runner, {
                let orchestrator = orchestrator.clone();
                move |sink| Box::pin(async move { orchestrator.recompute_all_scores(&sink).await })
            })
            .await?;
        }
        Command::Update { scope } => {
            let scopes = parse_scopes(&scope)?;
            run_blocking(&task_runner, {
                let orchestrator = orchestrator.clone();
                move |sink| Box::pin(async move { orchestrator.selective_update(&scopes, &sink).await })
            })
            .await?;
        }
        Command::Sweep => {
            run_blocking(&task_runner, {
                let orchestrator = orchestrator.clone();
                move |_sink| Box::pin(async move { orchestrator.maintenance_sweep().await })
            })
            .await?;
        }
        Command::Serve => {
            serve(orchestrator, task_runner).await?;
        }
    }

    Ok(())
}

fn parse_scopes(raw: &[String]) -> Result<HashSet<SelectiveScope>> {
    raw.iter()
        .map(|s| match s.as_str() {
            "candidates" => Ok(SelectiveScope::Candidates),
            "follow" => Ok(SelectiveScope::Follow),
            "bids" => Ok(SelectiveScope::Bids),
            other => Err(anyhow::anyhow!("unknown update scope: {other}")),
        })
        .collect()
}

/// Submits a task and blocks the CLI process until it finishes, printing
/// progress as it arrives. The task runner's single-flight busy guard only
/// matters when several callers share one long-lived process (e.g. `serve`);
/// a one-shot CLI invocation never races itself.
async fn run_blocking<T, F>(task_runner: &TaskRunner, task: F) -> Result<()>
where
    T: Send + std::fmt::Debug + 'static,
    F: FnOnce(ProgressSink) -> qb_orchestrator::BoxFuture<Result<T, qb_common::QuickBuyError>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
    let tx_err = tx.clone();

    task_runner.submit(
        task,
        TaskCallbacks {
            on_result: Box::new(move |value| {
                if let Some(sender) = tx.lock().unwrap().take() {
                    let _ = sender.send(Ok(value));
                }
            }),
            on_error: Box::new(move |e| {
                if let Some(sender) = tx_err.lock().unwrap().take() {
                    let _ = sender.send(Err(e));
                }
            }),
            on_finished: Box::new(|| info!("task finished")),
            on_progress_text: Some(Arc::new(|text| info!(progress = %text, "task progress"))),
            on_progress_pct: Some(Arc::new(|pct| info!(percent = pct, "task progress"))),
        },
    )?;

    match rx.await {
        Ok(Ok(value)) => {
            info!(result = ?value, "task succeeded");
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!(e)),
        Err(_) => Err(anyhow::anyhow!("task runner dropped its result channel")),
    }
}

async fn serve(orchestrator: Arc<Orchestrator>, task_runner: Arc<TaskRunner>) -> Result<()> {
    let settings_path = PathBuf::from(SETTINGS_FILE);
    Settings::load_or_init(&settings_path)?;

    let is_busy = {
        let task_runner = task_runner.clone();
        Arc::new(move || task_runner.is_busy())
    };

    let auto_extract_job = {
        let orchestrator = orchestrator.clone();
        let task_runner = task_runner.clone();
        ScheduledJob {
            name: "auto_extract",
            dispatch: Box::new(move || {
                let orchestrator = orchestrator.clone();
                let task_runner = task_runner.clone();
                Box::pin(async move {
                    let yesterday = chrono::Utc::now().date_naive() - chrono::Duration::days(1);
                    let _ = task_runner.submit(
                        move |sink| {
                            Box::pin(async move {
                                orchestrator.full_harvest(yesterday, yesterday, None, &sink).await
                            })
                        },
                        TaskCallbacks::default(),
                    );
                })
            }),
        }
    };

    let auto_update_job = {
        let orchestrator = orchestrator.clone();
        let task_runner = task_runner.clone();
        ScheduledJob {
            name: "auto_update",
            dispatch: Box::new(move || {
                let orchestrator = orchestrator.clone();
                let task_runner = task_runner.clone();
                Box::pin(async move {
                    let scopes: HashSet<SelectiveScope> = [SelectiveScope::Candidates, SelectiveScope::Follow, SelectiveScope::Bids]
                        .into_iter()
                        .collect();
                    let _ = task_runner.submit(
                        move |sink| Box::pin(async move { orchestrator.selective_update(&scopes, &sink).await }),
                        TaskCallbacks::default(),
                    );
                })
            }),
        }
    };

    info!("scheduler started, ticking every 30s");
    let scheduler = Arc::new(Scheduler::new(settings_path, is_busy, auto_extract_job, auto_update_job));
    scheduler.run().await;
    Ok(())
}
