mod config;
mod http;
mod source;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use facemetry_core::export::{to_csv, to_json};
use facemetry_core::prediction::format_predictions;
use facemetry_core::{
    analyze, rank_predictions, CalibrationTable, LandmarkSet, MetricEngine, ShapeClassifier,
};
use facemetry_queue::{
    CaptureMethod, ClassNameError, MemoryStore, Persistence, QueueConfig, RegistrationQueue,
    RegistrationStatus, SqliteStore, SystemClock,
};
use http::HttpTransport;
use serde::Deserialize;
use source::DirectorySource;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facemetry", about = "Facial proportion analysis and sample registration")]
struct Cli {
    /// Registration endpoint (overrides FACEMETRY_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,
    /// Pending-queue database (overrides FACEMETRY_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a 68-point landmark file
    Analyze {
        /// JSON landmarks: flat array of {x, y} or grouped object
        input: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Calibration TOML (overrides FACEMETRY_CALIBRATION)
        #[arg(long)]
        calibration: Option<PathBuf>,
        /// Comma-separated metric groups, e.g. "proportion,thirds"
        #[arg(long)]
        groups: Option<String>,
    },
    /// Rank an external classifier's probabilities
    Rank {
        /// JSON object with "labels" and "probabilities" arrays
        input: PathBuf,
        /// Number of predictions to show
        #[arg(short = 'n', long, default_value_t = 5)]
        top: usize,
    },
    /// Upload samples for a class; failed uploads are queued
    Register {
        /// Class name
        #[arg(short, long)]
        class: String,
        #[arg(short, long, default_value_t = CaptureMethod::Upload)]
        method: CaptureMethod,
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List queued samples
    Pending {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retry queued samples, reading files from a directory
    Sync {
        #[arg(short, long)]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
}

#[derive(Deserialize)]
struct PredictionInput {
    labels: Vec<String>,
    probabilities: Vec<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Analyze {
            input,
            format,
            output,
            calibration,
            groups,
        } => {
            if let Some(path) = calibration {
                config.calibration = Some(path);
            }
            if let Some(groups) = groups {
                config.groups = config::parse_groups(&groups);
            }
            run_analyze(&config, &input, format, output.as_deref())?;
        }
        Commands::Rank { input, top } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let parsed: PredictionInput = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", input.display()))?;
            let ranked = rank_predictions(parsed.labels.as_slice(), &parsed.probabilities)?;
            println!("{}", format_predictions(&ranked, top));
        }
        Commands::Register {
            class,
            method,
            files,
        } => run_register(&config, &class, method, &files).await?,
        Commands::Pending { json } => {
            let queue = open_queue(&config)?;
            let pending = queue.pending();
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
            } else if pending.is_empty() {
                println!("No pending samples");
            } else {
                for record in &pending {
                    println!(
                        "{}  {:<16} {:<7} {}",
                        record.created_at.to_rfc3339(),
                        record.class_name,
                        record.method.as_str(),
                        record.file_name
                    );
                }
            }
        }
        Commands::Sync { dir } => {
            let queue = open_queue(&config)?;
            let summary = queue.retry_pending(&DirectorySource::new(dir)).await;
            println!(
                "Synced {} of {} attempted ({} failed, {} missing files); {} still pending",
                summary.synced,
                summary.attempted,
                summary.failed,
                summary.missing,
                summary.still_pending
            );
        }
    }

    Ok(())
}

fn run_analyze(config: &Config, input: &Path, format: Format, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let landmarks: LandmarkSet = serde_json::from_str(&raw)
        .with_context(|| format!("parsing landmarks from {}", input.display()))?;

    let (mut table, classifier) = match &config.calibration {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("reading calibration {}", path.display()))?;
            let table = CalibrationTable::from_toml_str(&src)
                .with_context(|| format!("loading calibration {}", path.display()))?;
            let classifier = ShapeClassifier::from_toml_str(&src)
                .with_context(|| format!("loading shape rules from {}", path.display()))?;
            (table, classifier)
        }
        None => (CalibrationTable::default(), ShapeClassifier::default()),
    };
    if !config.groups.is_empty() {
        table = table.with_groups(&config.groups);
    }

    let report = analyze(&landmarks, &MetricEngine::new(table), &classifier)?;
    let rendered = match format {
        Format::Text => report.to_string(),
        Format::Json => to_json(&report.metrics)?,
        Format::Csv => to_csv(&report.metrics),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

type CliQueue = RegistrationQueue<HttpTransport, Box<dyn Persistence>, SystemClock>;

/// SQLite store at `path`, or an in-memory store if it cannot be opened.
fn open_store(path: &Path) -> Box<dyn Persistence> {
    match SqliteStore::open(path) {
        Ok(store) => {
            tracing::debug!(db = %path.display(), "queue store opened");
            Box::new(store)
        }
        Err(e) => {
            tracing::warn!(
                db = %path.display(),
                error = %e,
                "cannot open queue store; pending samples are held in memory for this run"
            );
            eprintln!(
                "warning: cannot open {} ({e}); queued samples will not survive this run",
                path.display()
            );
            Box::new(MemoryStore::new())
        }
    }
}

fn open_queue(config: &Config) -> Result<CliQueue> {
    let transport = HttpTransport::new(config.endpoint.clone(), config.upload_timeout)
        .context("building HTTP client")?;
    Ok(RegistrationQueue::open(
        transport,
        open_store(&config.db_path),
        SystemClock,
        QueueConfig {
            user_id: config.user_id.clone(),
            ..QueueConfig::default()
        },
    ))
}

async fn run_register(
    config: &Config,
    class: &str,
    method: CaptureMethod,
    files: &[PathBuf],
) -> Result<()> {
    let queue = open_queue(config)?;
    match queue.try_add_class(class) {
        Ok(()) => {}
        Err(ClassNameError::Duplicate(_)) => {
            queue.select_class(class);
        }
        Err(e) => bail!(e),
    }

    for path in files {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let cancel = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let outcome = queue
            .register_sample_until(class, bytes, &file_name, method, cancel)
            .await?;

        match outcome.status {
            RegistrationStatus::Synced => println!("{file_name}: synced"),
            RegistrationStatus::Queued { reason, persisted } => {
                let kind = reason.category();
                if persisted {
                    println!("{file_name}: queued ({kind}: {reason})");
                } else {
                    println!("{file_name}: queued in memory only ({kind}: {reason})");
                }
            }
        }
    }

    let pending = queue.pending().len();
    if pending > 0 {
        println!("{pending} sample(s) pending; run `facemetry sync --dir <dir>` to retry");
    }
    Ok(())
}
