//! Application entry point for the `codemetal-hydroflow` ingestion service.
//!
//! Startup is the same for every subcommand: tracing, `.env` and environment
//! config, the document store (PostgreSQL with its schema, or in-memory with
//! `--memory`), then one registered pipeline per configured source. `serve`
//! (the default) starts the timers and the Axum control API; `run`,
//! `pipelines` and `migrate-legacy` are one-shot.
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required** unless `--memory`) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see `config.rs` for per-source variables
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating schema setup to `schema`, configuration parsing to `config`,
//! pipeline wiring to `pipelines` and route registration to `routes`.
use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use axum::Router;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use hydroflow::routes::{self, AppState};
use hydroflow::{config, migrate, pipelines, schema};
use hydroflow::{Config, DocumentStore, MemoryStore, PgDocumentStore, RetryClient, Scheduler};

#[derive(Parser, Debug)]
#[command(author, version, about = "Hydrological telemetry ingestion service", long_about = None)]
struct Cli {
    /// Use an in-process store instead of PostgreSQL (nothing is persisted)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the schedulers and the control API (default)
    Serve,
    /// Run one pipeline once and print its report
    Run { name: String },
    /// List the pipelines enabled by the current configuration
    Pipelines,
    /// Split legacy flat-history station documents into metadata/current/buckets
    MigrateLegacy(MigrateArgs),
}

#[derive(Args, Debug, Default)]
struct MigrateArgs {
    /// Report what would be migrated without writing anything
    #[arg(long)]
    dry_run: bool,
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cli = Cli::parse();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let store = connect_store(&cfg, cli.memory).await?;
    let client = RetryClient::new(cfg.backoff)?;

    let mut scheduler = Scheduler::new(cfg.startup_delay);
    pipelines::register_all(&cfg, &client, &store, &mut scheduler);
    let scheduler = Arc::new(scheduler);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg, scheduler, store).await,
        Command::Run { name } => {
            let report = scheduler.run_now(&name).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.success {
                Ok(())
            } else {
                Err(anyhow!("pipeline '{}' failed: {}", name, report.message))
            }
        }
        Command::Pipelines => {
            for status in scheduler.status().await {
                println!("{:<24} every {}s", status.name, status.interval_secs);
            }
            Ok(())
        }
        Command::MigrateLegacy(args) => {
            let report = migrate::run_migration(store.as_ref(), args.dry_run).await?;
            tracing::info!(?report, dry_run = args.dry_run, "legacy migration finished");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn connect_store(cfg: &Config, memory: bool) -> Result<Arc<dyn DocumentStore>> {
    // ---
    if memory {
        tracing::warn!("Using in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db_url = cfg
        .db_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set in .env or environment"))?;
    let masked = config::mask_db_url(db_url);
    tracing::info!("Attempting to connect to database: {}", masked);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to database '{}': {}", masked, e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;
    Ok(Arc::new(PgDocumentStore::new(pool)))
}

async fn serve(cfg: Config, scheduler: Arc<Scheduler>, store: Arc<dyn DocumentStore>) -> Result<()> {
    // ---
    let timers = scheduler.spawn_all();
    tracing::info!(
        "Started {} pipeline timer(s), first runs in {:?}",
        timers.len(),
        cfg.startup_delay
    );

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(AppState { scheduler, store });

    tracing::info!("Listening on {}", cfg.http_bind);
    let listener = tokio::net::TcpListener::bind(cfg.http_bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await?;

    for timer in timers {
        timer.abort();
    }
    Ok(())
}

// ---

/// Install the global `tracing` subscriber.
///
/// Output is compact with target, file and line. Knobs:
/// - `FORCE_COLOR`: `1|true|yes` forces ANSI colors, `0|false|no` disables
///   them, anything else follows whether stdout is a terminal
/// - `AXUM_SPAN_EVENTS`: `full` or `enter_exit`; default logs span close only
/// - `RUST_LOG` wins over `AXUM_LOG_LEVEL` (default `debug`)
///
/// Each pipeline run is a `pipeline` span, so the default close-only mode
/// ends every run with one timing line.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
