mod api;
mod database;
mod events;
mod media;
mod pipeline;
mod recognizer;
mod sampler;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, Context};
use clap::Parser;
use tracing::info;

use crate::api::AppState;
use crate::database::repo::ResultStore;
use crate::events::{EventBus, InMemoryLibrary, MediaLibrary};
use crate::media::frames::FfmpegFrameProvider;
use crate::pipeline::PipelineController;
use crate::recognizer::RecognizerClient;
use crate::utils::config::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database for recognition results.
    #[arg(short, long, default_value = "jellyray.db")]
    db_path: PathBuf,

    /// Key=Value config file; defaults apply when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the query/ingress API.
    #[arg(short, long, default_value = "0.0.0.0:8097")]
    listen: String,

    /// Scratch directory for temporary frame files.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    info!("JellyRay pipeline starting");
    info!("DB: {:?}", args.db_path);
    info!("Recognizer: {}", config.recognizer_api_url);

    // The pipeline cannot run without its record store.
    let store = Arc::new(ResultStore::new(&args.db_path).context("Store initialization failed")?);

    let scratch_dir = args
        .scratch_dir
        .unwrap_or_else(|| std::env::temp_dir().join("jellyray"));
    std::fs::create_dir_all(&scratch_dir)
        .with_context(|| format!("Failed to create scratch dir {:?}", scratch_dir))?;

    let library = Arc::new(InMemoryLibrary::new());
    let bus = Arc::new(EventBus::new());

    let recognizer = RecognizerClient::new(
        config.recognizer_api_url.clone(),
        Duration::from_secs(config.recognize_timeout_seconds),
    )?;

    let controller = Arc::new(PipelineController::new(
        Arc::clone(&store),
        Arc::clone(&library) as Arc<dyn MediaLibrary>,
        Arc::new(FfmpegFrameProvider),
        recognizer,
        config,
        scratch_dir,
    ));

    let (subscription, rx) = bus.subscribe();
    let pipeline_handle = controller.spawn(rx);

    let app = api::router(AppState {
        store,
        bus: Arc::clone(&bus),
        library,
    });

    let listener = tokio::net::TcpListener::bind(args.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("API listening on {}", args.listen);

    axum::serve(listener, app).await.context("API server failed")?;

    // Detach before joining so the pipeline loop sees its channel close.
    bus.detach(subscription);
    pipeline_handle.await.ok();
    Ok(())
}
