//! Workbench CLI
//!
//! Command-line front end over the local filesystem backend: train models
//! from CSV files, then list, compare, clone, delete and export versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{LocalFsBackend, PipelineRecord};
use crate::config::WorkbenchConfig;
use crate::features::{ImageConfig, LabelSelection};
use crate::orchestrator::{ProgressEvent, TrainingEngine, TrainingRequest};
use crate::preprocessing::Step;
use crate::registry::{ExportFormat, ModelStatus, ModelVersion};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString {
    s.truecolor(100, 100, 100)
}

fn accent(s: &str) -> ColoredString {
    s.truecolor(120, 170, 255)
}

fn muted(s: &str) -> ColoredString {
    s.truecolor(140, 140, 140)
}

fn ok(s: &str) -> ColoredString {
    s.truecolor(100, 210, 120)
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn status_label(status: ModelStatus) -> ColoredString {
    match status {
        ModelStatus::Completed => ok(status.as_str()),
        ModelStatus::Training => accent(status.as_str()),
        ModelStatus::Cancelled => status.as_str().yellow(),
        ModelStatus::Failed => status.as_str().red(),
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "-".to_string())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "workbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, version and compare models from the command line")]
pub struct Cli {
    /// Data directory for datasets, jobs and model records
    #[arg(long, global = true, env = "WORKBENCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on a CSV file or a stored dataset
    Train {
        /// CSV file to import as a new dataset
        #[arg(short, long, conflicts_with = "dataset")]
        data: Option<PathBuf>,

        /// Id of a dataset already in the data directory
        #[arg(long)]
        dataset: Option<String>,

        /// Pipeline JSON: a pipeline record or a bare array of steps
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        /// Model family (neural_network, convolutional, linear_regression, logistic_regression)
        #[arg(short, long, default_value = "neural_network")]
        model: String,

        /// Hyperparameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Label column (default: last numeric column)
        #[arg(short, long)]
        label: Option<String>,

        #[arg(long, default_value = "0.2")]
        test_size: f64,

        #[arg(long, default_value = "0.1")]
        validation_size: f64,

        #[arg(long)]
        seed: Option<u64>,

        /// Model name
        #[arg(short, long)]
        name: Option<String>,

        /// Image size for image datasets, e.g. 32x32
        #[arg(long)]
        image_size: Option<String>,

        /// Convert images to grayscale
        #[arg(long)]
        grayscale: bool,
    },

    /// List model versions, newest first
    List,

    /// Compare model versions
    Compare {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Clone a version and retrain it
    Clone {
        id: String,

        #[arg(short, long)]
        name: String,

        /// Replacement hyperparameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },

    /// Delete a version
    Delete { id: String },

    /// Export a version as JSON
    Export {
        id: String,

        /// json (full record) or artifact (model data only)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show registry statistics
    Stats,

    /// Show the ancestry of a version
    Lineage { id: String },
}

// ─── Setup ─────────────────────────────────────────────────────────────────────

pub fn load_config(cli: &Cli) -> anyhow::Result<WorkbenchConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkbenchConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WorkbenchConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn open(config: WorkbenchConfig) -> anyhow::Result<(Arc<LocalFsBackend>, TrainingEngine)> {
    let backend = Arc::new(
        LocalFsBackend::open(&config.data_dir)
            .await
            .with_context(|| format!("opening data directory {}", config.data_dir.display()))?,
    );
    let engine = TrainingEngine::with_backend(config, backend.clone());
    engine.sync().await?;
    Ok((backend, engine))
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(s).context("--params must be a JSON object"))
        .transpose()
}

fn parse_size(raw: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("image size must look like 32x32"))?;
    Ok((w.trim().parse()?, h.trim().parse()?))
}

async fn import_pipeline(backend: &LocalFsBackend, path: &Path) -> anyhow::Result<String> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading pipeline {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    let record = if value.is_array() {
        let steps: Vec<Step> = serde_json::from_value(value)?;
        PipelineRecord {
            id: Uuid::new_v4().to_string(),
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string()),
            steps,
        }
    } else {
        serde_json::from_value(value)?
    };
    backend.save_pipeline(&record).await?;
    Ok(record.id)
}

/// Print progress events until the sender side closes
fn spawn_progress_printer() -> (
    mpsc::UnboundedSender<ProgressEvent>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Phase { progress, message, .. } => {
                    println!("  {} {:>5.1}% {}", accent("›"), progress, message);
                }
                ProgressEvent::Epoch {
                    epoch,
                    total_epochs,
                    loss,
                    accuracy,
                    validation_loss,
                    ..
                } => {
                    println!(
                        "    {} {:>4}/{:<4} loss {:.5}  acc {}  val_loss {}",
                        dim("epoch"),
                        epoch,
                        total_epochs,
                        loss,
                        fmt_opt(accuracy),
                        fmt_opt(validation_loss)
                    );
                }
                ProgressEvent::Failed { message, .. } => {
                    println!("  {} {}", "✗".red(), message);
                }
                _ => {}
            }
        }
    });
    (tx, handle)
}

fn print_version(model: &ModelVersion) {
    kv("Id", &model.id);
    kv("Version", &model.version);
    kv("Type", &model.model_type);
    println!("  {:<18} {}", muted("Status"), status_label(model.status));
    kv("Loss", &format!("{:.5}", model.metrics.loss));
    kv("Accuracy", &fmt_opt(model.metrics.accuracy));
    kv("Validation loss", &fmt_opt(model.metrics.validation_loss));
    kv("Training time", &format!("{:.2}s", model.metrics.training_time));
    if let Some(parent) = &model.parent_model_id {
        kv("Parent", parent);
    }
    if let Some(msg) = &model.error_message {
        kv("Error", msg);
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Commands::Train {
            data,
            dataset,
            pipeline,
            model,
            params,
            label,
            test_size,
            validation_size,
            seed,
            name,
            image_size,
            grayscale,
        } => {
            let (backend, engine) = open(config).await?;
            section("Train");

            let dataset_id = match (data, dataset) {
                (Some(path), _) => {
                    let record = backend.import_csv(&path, None).await?;
                    step_ok(&format!("Imported {} as dataset {}", path.display(), record.id));
                    record.id
                }
                (None, Some(id)) => id,
                (None, None) => anyhow::bail!("either --data or --dataset is required"),
            };

            let mut request = TrainingRequest::new(dataset_id, model).with_split(test_size, validation_size);
            if let Some(path) = pipeline {
                let id = import_pipeline(&backend, &path).await?;
                step_ok(&format!("Registered pipeline {}", id));
                request = request.with_pipeline(id);
            }
            if let Some(params) = parse_params(params.as_deref())? {
                request = request.with_hyperparameters(params);
            }
            if let Some(label) = label {
                request = request.with_label(LabelSelection::Column(label));
            }
            if let Some(seed) = seed {
                request = request.with_random_state(seed);
            }
            if let Some(name) = name {
                request = request.with_name(name);
            }
            if let Some(size) = image_size {
                let (w, h) = parse_size(&size)?;
                request = request.with_image_config(
                    ImageConfig::new().with_size(w, h).with_grayscale(grayscale),
                );
            }

            let (tx, printer) = spawn_progress_printer();
            let start = Instant::now();
            let result = engine.start_training(request, Some(tx)).await;
            let _ = printer.await;

            println!();
            match result {
                Ok(model) => {
                    print_version(&model);
                    kv("Wall time", &format!("{:.2?}", start.elapsed()));
                    println!();
                    Ok(())
                }
                Err(e) => {
                    println!("  {} {}", "✗".red(), e.user_message());
                    Err(e.into())
                }
            }
        }
        Commands::List => {
            let (_, engine) = open(config).await?;
            section("Models");
            let models = engine.list_models();
            if models.is_empty() {
                println!("  {}", dim("no models yet"));
            }
            println!(
                "  {:<38} {:<6} {:<20} {:<10} {:>9} {:>9}",
                muted("Id"),
                muted("Ver"),
                muted("Type"),
                muted("Status"),
                muted("Loss"),
                muted("Acc")
            );
            for m in models {
                let latest = if m.is_latest_version { ok("*") } else { dim(" ") };
                println!(
                    "  {:<38} {:<6} {:<20} {:<10} {:>9.4} {:>9}{}",
                    m.id,
                    m.version,
                    m.model_type,
                    status_label(m.status),
                    m.metrics.loss,
                    fmt_opt(m.metrics.accuracy),
                    latest
                );
            }
            println!();
            Ok(())
        }
        Commands::Compare { ids } => {
            let (_, engine) = open(config).await?;
            section("Compare");
            let cmp = engine.compare_models(&ids);
            for m in &cmp.models {
                println!(
                    "  {:<38} {:<6} loss {:>9.4}  acc {:>7}  time {:>7.2}s",
                    m.id,
                    m.version,
                    m.metrics.loss,
                    fmt_opt(m.metrics.accuracy),
                    m.metrics.training_time
                );
            }
            println!();
            let none = "-".to_string();
            kv("Best accuracy", cmp.best_accuracy.as_ref().unwrap_or(&none));
            kv("Best loss", cmp.best_loss.as_ref().unwrap_or(&none));
            kv("Fastest", cmp.fastest_training.as_ref().unwrap_or(&none));
            println!();
            Ok(())
        }
        Commands::Clone { id, name, params } => {
            let (_, engine) = open(config).await?;
            section("Clone");
            let params = parse_params(params.as_deref())?;
            let (tx, printer) = spawn_progress_printer();
            let result = engine.clone_model(&id, &name, params, Some(tx)).await;
            let _ = printer.await;
            println!();
            let model = result?;
            print_version(&model);
            println!();
            Ok(())
        }
        Commands::Delete { id } => {
            let (_, engine) = open(config).await?;
            engine.delete_model(&id).await?;
            step_ok(&format!("Deleted {}", id));
            Ok(())
        }
        Commands::Export { id, format, output } => {
            let (_, engine) = open(config).await?;
            let format: ExportFormat = format.parse()?;
            let value = engine.export_model(&id, format)?;
            let json = serde_json::to_string_pretty(&value)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    step_ok(&format!("Exported {} to {}", id, path.display()));
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Stats => {
            let (_, engine) = open(config).await?;
            let stats = engine.statistics();
            section("Statistics");
            kv("Models", &stats.total.to_string());
            kv("Completed", &stats.completed.to_string());
            kv("Mean accuracy", &format!("{:.4}", stats.average_accuracy));
            kv("Mean loss", &format!("{:.4}", stats.average_loss));
            kv("Mean train time", &format!("{:.2}s", stats.average_training_time));
            println!();
            for (model_type, count) in &stats.by_type {
                kv(model_type, &count.to_string());
            }
            for (status, count) in &stats.by_status {
                println!("  {:<18} {}", status_label(*status), count);
            }
            println!();
            Ok(())
        }
        Commands::Lineage { id } => {
            let (_, engine) = open(config).await?;
            section("Lineage");
            for (depth, m) in engine.lineage(&id)?.iter().enumerate() {
                println!(
                    "  {}{} {} {} {}",
                    "  ".repeat(depth),
                    if depth == 0 { accent("●") } else { dim("└") },
                    m.version,
                    m.name,
                    status_label(m.status)
                );
            }
            println!();
            Ok(())
        }
    }
}
