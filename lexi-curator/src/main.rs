//! lexi-curator - vocabulary image curation service
//!
//! Finds, scores and selects an image for each vocabulary word, keeping an
//! audited record of every decision.
//!
//! - `serve`: HTTP API + SSE progress stream (default port 5731)
//! - `run`: one batch in the foreground, JSON summary on stdout
//! - `resume`: finish words left in the queue by an interrupted run
//! - `repair`: re-download assets for selected records without a local file

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lexi_common::config::{RootFolderInitializer, RootFolderResolver};
use lexi_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lexi_curator::config::{self, CuratorConfig};
use lexi_curator::models::BatchConfig;
use lexi_curator::pipeline::{build_pipeline, PipelinePaths};
use lexi_curator::services::{BatchControl, BatchOrchestrator};
use lexi_curator::{AppState, DEFAULT_PORT, SERVICE_NAME};

#[derive(Parser)]
#[command(name = "lexi-curator", version, about = "Vocabulary image curation")]
struct Cli {
    /// Root folder holding the database, cache and image library
    #[arg(long, global = true, env = "LEXI_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Curate a vocabulary file (JSON) or lesson CSV directory
    Run(RunArgs),
    /// Process words still pending in the queue
    Resume {
        #[arg(long)]
        no_download: bool,
    },
    /// Re-download missing assets of selected records
    Repair,
}

#[derive(Args)]
struct RunArgs {
    /// JSON array of vocabulary items, or a directory of lesson CSV files
    #[arg(long)]
    vocab: PathBuf,
    /// Search and score without persisting or downloading
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    no_download: bool,
    /// Skip the vision model; every candidate gets the neutral score
    #[arg(long)]
    no_scoring: bool,
    /// Vision model (auto-detected when omitted)
    #[arg(long)]
    model: Option<String>,
    /// Minimum total score out of 40
    #[arg(long)]
    min_score: Option<u32>,
    /// Minimum relevance out of 10
    #[arg(long)]
    min_relevance: Option<u8>,
    #[arg(long)]
    candidates: Option<usize>,
    #[arg(long)]
    gpu_throttle: Option<u8>,
    /// Lesson id substring filter
    #[arg(long)]
    lesson: Option<String>,
    /// Category filter
    #[arg(long)]
    category: Option<String>,
    /// Only these words
    #[arg(long, num_args = 1..)]
    words: Vec<String>,
}

impl RunArgs {
    fn apply(&self, mut config: BatchConfig) -> BatchConfig {
        config.dry_run |= self.dry_run;
        config.download_images &= !self.no_download;
        config.scoring_enabled &= !self.no_scoring;
        if let Some(model) = &self.model {
            config.vision_model = Some(model.clone());
        }
        if let Some(min_score) = self.min_score {
            config.min_score = min_score;
        }
        if let Some(min_relevance) = self.min_relevance {
            config.min_relevance = min_relevance;
        }
        if let Some(candidates) = self.candidates {
            config.candidates_per_word = candidates.max(1);
        }
        if let Some(gpu_throttle) = self.gpu_throttle {
            config.gpu_throttle_percent = gpu_throttle.min(100);
        }
        if self.lesson.is_some() {
            config.lesson_filter = self.lesson.clone();
        }
        if self.category.is_some() {
            config.category_filter = self.category.clone();
        }
        if !self.words.is_empty() {
            config.word_filter = self.words.clone();
        }
        config
    }
}

fn init_tracing(config: &CuratorConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn,hyper=info", default_level)));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// Stop the batch at the next word boundary on Ctrl-C
fn stop_on_ctrl_c(control: BatchControl) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current word");
            control.stop();
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let curator_config = config::load_curator_config().context("Failed to load configuration")?;
    init_tracing(&curator_config, cli.verbose);
    config::validate(&curator_config)?;

    info!(
        "Starting {} v{} [{}] built {} ({})",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(SERVICE_NAME)
        .with_cli_arg(cli.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = lexi_curator::db::init_database_pool(&db_path).await?;

    let event_bus = EventBus::new(256);
    let services = build_pipeline(
        db_pool,
        event_bus,
        &curator_config,
        &PipelinePaths::from_root(&initializer),
    )
    .await?;
    let orchestrator = Arc::new(BatchOrchestrator::new(services));

    match cli.command {
        Command::Serve { port, bind } => {
            let state = AppState::new(Arc::clone(&orchestrator))
                .with_batch_defaults(curator_config.batch.clone());
            let app = lexi_curator::build_router(state)
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive());

            let addr = format!("{}:{}", bind, port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Listening on http://{}", addr);
            info!("Health check: http://{}/health", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutting down");
                })
                .await?;
        }
        Command::Run(args) => {
            let items = lexi_curator::vocabulary::load_vocabulary(&args.vocab).await?;
            let batch_config = args.apply(curator_config.batch.clone());

            let control = BatchControl::new();
            stop_on_ctrl_c(control.clone());
            let summary = orchestrator.run(items, batch_config, control).await?;
            print_json(&summary)?;
        }
        Command::Resume { no_download } => {
            let mut batch_config = curator_config.batch.clone();
            batch_config.download_images &= !no_download;

            let control = BatchControl::new();
            stop_on_ctrl_c(control.clone());
            let summary = orchestrator.resume_pending(batch_config, control).await?;
            print_json(&summary)?;
        }
        Command::Repair => {
            let control = BatchControl::new();
            stop_on_ctrl_c(control.clone());
            let summary = orchestrator.repair_missing_assets(control).await?;
            print_json(&summary)?;
        }
    }

    Ok(())
}
