use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stockline::activity::ActivityTracker;
use stockline::api::{HttpTransport, Transport};
use stockline::config::Config;
use stockline::export::{ExportCategory, ExportConsumer, ExportJobClient, ExportOrchestrator, ExportStatus};
use stockline::inventory::{Entity, Product, Repository, RepositoryConfig, Stock, Warehouse};

#[derive(Parser, Debug)]
#[command(name = "stockline")]
#[command(about = "Command-line client for the inventory API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stockline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all records of an entity
  List {
    entity: EntityKind,
    /// Only active records
    #[arg(long)]
    active: bool,
  },
  /// Show one record
  Get { entity: EntityKind, id: String },
  /// Full-text search
  Search { entity: EntityKind, query: String },
  Activate { entity: EntityKind, id: String },
  Deactivate { entity: EntityKind, id: String },
  Delete { entity: EntityKind, id: String },
  /// Start an export and follow it until it finishes
  Export { category: ExportCategory },
  /// List completed export files
  Exports { category: ExportCategory },
  /// Download a completed export
  Download {
    job_id: String,
    /// Output file (default: <job-id>.xlsx)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntityKind {
  Warehouse,
  Product,
  Stock,
}

impl Command {
  fn entity(&self) -> Option<EntityKind> {
    match self {
      Command::List { entity, .. }
      | Command::Get { entity, .. }
      | Command::Search { entity, .. }
      | Command::Activate { entity, .. }
      | Command::Deactivate { entity, .. }
      | Command::Delete { entity, .. } => Some(*entity),
      _ => None,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging()?;

  let activity = ActivityTracker::new();
  let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config, activity)?);

  match args.command.entity() {
    Some(EntityKind::Warehouse) => run_entity::<Warehouse>(transport, &config, &args.command).await,
    Some(EntityKind::Product) => run_entity::<Product>(transport, &config, &args.command).await,
    Some(EntityKind::Stock) => run_entity::<Stock>(transport, &config, &args.command).await,
    None => run_export(transport, &config, args.command).await,
  }
}

/// Log to a daily file so stdout only carries command output.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = Config::log_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "stockline.log"));
  let env_filter = EnvFilter::try_from_env("STOCKLINE_LOG").or_else(|_| EnvFilter::try_new("stockline=info"))?;

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(guard)
}

async fn run_entity<T: Entity>(transport: Arc<dyn Transport>, config: &Config, command: &Command) -> Result<()> {
  let repo = Repository::<T>::new(transport, RepositoryConfig::from_config::<T>(config));

  match command {
    Command::List { active: true, .. } => print_json(&repo.find_active(None).await?),
    Command::List { active: false, .. } => print_json(&repo.find_all(None).await?),
    Command::Get { id, .. } => print_json(&repo.find_by_id(id).await?),
    Command::Search { query, .. } => print_json(&repo.search(query, None).await?),
    Command::Activate { id, .. } => print_json(&repo.activate(id).await?),
    Command::Deactivate { id, .. } => print_json(&repo.deactivate(id).await?),
    Command::Delete { id, .. } => {
      repo.remove(id).await?;
      println!("Deleted {} {}", T::NAME, id);
      Ok(())
    }
    other => Err(eyre!("Not an entity command: {:?}", other)),
  }
}

async fn run_export(transport: Arc<dyn Transport>, config: &Config, command: Command) -> Result<()> {
  let client = ExportJobClient::new(transport).with_retry(config.retry.policy());
  let exports = ExportOrchestrator::from_config(client, &config.export);
  let consumer = ExportConsumer::new();

  match command {
    Command::Export { category } => {
      let mut last_status = None;
      let _progress = consumer.subscribe(move |state| {
        if state.current_status != last_status {
          last_status = state.current_status;
          if let Some(status) = last_status {
            println!("{}", status);
          }
        }
      });

      let job_id = exports.initiate_export(category, &consumer).await?;
      println!("Export job {} started", job_id);

      let state = consumer.settled().await?;
      match state.exported_files.first() {
        Some(file) if state.current_status.is_none() => {
          println!("{}  {}", file.file_name, file.file_url);
        }
        _ if state.current_status == Some(ExportStatus::Completed) => {
          println!("Export {} completed without a file", job_id);
        }
        _ => {}
      }
      Ok(())
    }
    Command::Exports { category } => {
      exports.load_existing_export_jobs(category, &consumer).await?;
      for file in consumer.state().exported_files {
        println!(
          "{}  {}  {}  {}",
          file.job_id,
          file.created_at.format("%Y-%m-%d %H:%M"),
          file.file_name,
          file.file_url
        );
      }
      Ok(())
    }
    Command::Download { job_id, output } => {
      let bytes = exports.download_export(&job_id).await?;
      let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.xlsx", job_id)));
      std::fs::write(&path, &bytes).map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
      println!("Saved {} bytes to {}", bytes.len(), path.display());
      Ok(())
    }
    other => Err(eyre!("Not an export command: {:?}", other)),
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
