//! numport-ingest - portability dataset ingestion tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use numport_common::logging::{init_logging, LogConfig, LogLevel};
use numport_ingest::fetch::Downloader;
use numport_ingest::heartbeat::read_liveness;
use numport_ingest::progress::{format_eta, table_size, ProgressReport, ProgressReporter};
use numport_ingest::reference::{load_sql_file, reference_counts, validate_ranges};
use numport_ingest::resume::{destination_row_count, processed_chunks, skipped_line_count};
use numport_ingest::splitter::ChunkSplitter;
use numport_ingest::{ImportController, ImportPipeline, IngestConfig, StatusHandle};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Parser, Debug)]
#[command(name = "numport-ingest")]
#[command(author, version, about = "Phone number portability ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a published dataset file
    Fetch {
        /// File name relative to the base URL (e.g. export_full_mysql.csv.gz)
        file: String,
    },

    /// Execute an operator reference SQL dump
    LoadReference {
        sql_file: PathBuf,

        /// Empty the target table first
        #[arg(long)]
        truncate: bool,
    },

    /// Split the source export into chunk files without loading them
    Split {
        /// Source file (defaults to NUMPORT_SOURCE_FILE)
        source: Option<PathBuf>,

        /// First chunk to write
        #[arg(long, default_value_t = 1)]
        first_chunk: u64,
    },

    /// Run the import pipeline, resuming where a previous run stopped
    Import {
        /// Source file (defaults to NUMPORT_SOURCE_FILE)
        source: Option<PathBuf>,

        /// Seconds between progress log lines
        #[arg(long, default_value_t = 30)]
        report_interval: u64,
    },

    /// Print import state as JSON
    Status,

    /// Follow import progress until it completes
    Monitor {
        /// Seconds between samples
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },

    /// Delete all imported rows, chunk files, staging tables and the heartbeat
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("numport-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Invalid ingest configuration")?;

    match cli.command {
        Command::Fetch { file } => {
            let downloader = Downloader::new(config.fetch.clone())?;
            let path = downloader.fetch(&file).await?;
            println!("{}", path.display());
        },
        Command::LoadReference {
            sql_file,
            truncate,
        } => {
            let pool = connect().await?;
            let load = load_sql_file(&pool, &sql_file, truncate).await?;
            let invalid_ranges = validate_ranges(&pool).await?;
            print_json(&serde_json::json!({
                "load": load,
                "invalid_ranges": invalid_ranges,
            }))?;
        },
        Command::Split {
            source,
            first_chunk,
        } => {
            let source = source.unwrap_or_else(|| config.source_file.clone());
            let splitter = ChunkSplitter::new(&config.chunk_dir, config.chunk_size);
            let cancel = shutdown_token();
            let spinner = create_spinner("Splitting source file")?;
            let (plan, written) = splitter.split(&source, first_chunk, &cancel).await?;
            spinner.finish_and_clear();
            print_json(&serde_json::json!({
                "plan": plan,
                "chunks_written": written.len(),
                "chunk_dir": config.chunk_dir,
            }))?;
        },
        Command::Import {
            source,
            report_interval,
        } => {
            let pool = connect().await?;
            run_import(pool, config, source, report_interval).await?;
        },
        Command::Status => {
            let pool = connect().await?;
            print_status(&pool, &config).await?;
        },
        Command::Monitor { interval } => {
            let pool = connect().await?;
            monitor(pool, &config, interval).await?;
        },
        Command::Reset { yes } => {
            if !yes {
                bail!("Refusing to reset without --yes: this deletes every imported row");
            }
            let pool = connect().await?;
            let controller = ImportController::new(pool, config);
            let report = controller.reset().await;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("Reset finished with {} failed step(s)", report.errors.len());
            }
        },
        Command::Migrate => {
            let pool = connect().await?;
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Migrations applied");
        },
    }

    Ok(())
}

async fn connect() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .context("Failed to connect to database")
}

/// Token cancelled on Ctrl+C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                },
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                },
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, stopping after the current chunk"),
            _ = terminate => info!("Received SIGTERM, stopping after the current chunk"),
        }
        cancel.cancel();
    });

    token
}

async fn run_import(
    pool: PgPool,
    config: IngestConfig,
    source: Option<PathBuf>,
    report_interval: u64,
) -> Result<()> {
    let liveness = read_liveness(&pool, config.heartbeat_stale_after()).await?;
    if liveness.active {
        bail!(
            "An import is already running on {} (last heartbeat {}s ago)",
            liveness.host.as_deref().unwrap_or("unknown host"),
            liveness.age_secs.unwrap_or_default()
        );
    }

    let source = source.unwrap_or_else(|| config.source_file.clone());
    let cancel = shutdown_token();

    let reporter_stop = CancellationToken::new();
    let mut reporter =
        ProgressReporter::new(pool.clone(), config.expected_total, config.heartbeat_stale_after());
    let stop = reporter_stop.clone();
    let reporter_handle = tokio::spawn(async move {
        reporter
            .run(Duration::from_secs(report_interval.max(1)), stop, |report| {
                log_report(report);
                ControlFlow::Continue(())
            })
            .await;
    });

    let pipeline = ImportPipeline::new(pool, config, StatusHandle::new());
    let result = pipeline.run(&source, cancel).await;

    reporter_stop.cancel();
    if let Err(e) = reporter_handle.await {
        warn!(error = %e, "Progress reporter task failed");
    }

    let summary = result?;
    print_json(&summary)?;
    Ok(())
}

async fn print_status(pool: &PgPool, config: &IngestConfig) -> Result<()> {
    let row_count = destination_row_count(pool).await?;
    let skipped_lines = skipped_line_count(pool).await?;
    let applied = row_count + skipped_lines;
    let liveness = read_liveness(pool, config.heartbeat_stale_after()).await?;
    let size = table_size(pool).await?;
    let counts = reference_counts(pool).await?;
    let chunks_on_disk = ChunkSplitter::new(&config.chunk_dir, config.chunk_size)
        .existing_chunks()
        .await?
        .len();

    let report = ProgressReport::compute(
        applied,
        config.expected_total,
        0.0,
        0.0,
        liveness.active,
        0,
    );

    print_json(&serde_json::json!({
        "row_count": row_count,
        "skipped_lines": skipped_lines,
        "expected_total": config.expected_total,
        "percent": report.percent,
        "complete": report.complete,
        "processed_chunks": processed_chunks(applied, config.chunk_size),
        "chunk_size": config.chunk_size,
        "chunks_on_disk": chunks_on_disk,
        "heartbeat": liveness,
        "table_size": size,
        "tables": counts,
    }))
}

async fn monitor(pool: PgPool, config: &IngestConfig, interval: u64) -> Result<()> {
    let bar = create_progress_bar(config.expected_total)?;
    let mut reporter = ProgressReporter::new(pool, config.expected_total, config.heartbeat_stale_after());

    reporter
        .run(Duration::from_secs(interval.max(1)), shutdown_token(), |report| {
            bar.set_position(report.row_count.min(config.expected_total));
            bar.set_message(format!(
                "{:.0} rows/s, ETA {}, {}",
                report.average_speed,
                report.eta_secs.map(format_eta).unwrap_or_else(|| "unknown".into()),
                if report.active { "running" } else { "idle" },
            ));

            if report.complete {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await;

    bar.finish();
    Ok(())
}

fn log_report(report: &ProgressReport) {
    info!(
        rows = report.row_count,
        expected = report.expected_total,
        percent = %format!("{:.2}", report.percent),
        speed = %format!("{:.0}", report.average_speed),
        eta = %report.eta_secs.map(format_eta).unwrap_or_else(|| "unknown".into()),
        active = report.active,
        "Import progress"
    );
}

fn create_progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {human_pos}/{human_len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
