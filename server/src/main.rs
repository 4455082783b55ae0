//! KrishiLok Advisory Server
//!
//! HTTP API over the disease detection and advisory pipeline: scan
//! submission, scan history, community advice, translation,
//! transcription and trust scores.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use krishilok::bootstrap::AdvisoryServices;
use krishilok::config::AppConfig;
use krishilok::utils::logging::{init_logging, LogConfig};

use crate::state::AppState;

/// Largest accepted upload (images and voice notes)
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// KrishiLok Advisory Server
#[derive(Parser, Debug)]
#[command(name = "krishilok-server")]
#[command(version)]
#[command(about = "HTTP API for crop disease detection and treatment advice")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "KRISHILOK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        .route("/crops", get(routes::health::list_crops))

        // Scans
        .route("/scans", post(routes::scans::create_scan).get(routes::scans::list_scans))
        .route("/scans/:id", get(routes::scans::get_scan).delete(routes::scans::delete_scan))
        .route("/scans/:id/advice", post(routes::scans::add_advice).get(routes::scans::list_advice))
        .route("/scans/:id/advice/:advice_id/helpful", post(routes::scans::mark_helpful))

        // Language
        .route("/language/translate", post(routes::language::translate))
        .route("/language/transcribe", post(routes::language::transcribe))
        .route("/language/supported", get(routes::language::supported))

        // Trust
        .route("/trust/feedback", post(routes::trust::submit_feedback))
        .route("/trust/:user_id", get(routes::trust::get_score))
        .route("/trust/:user_id/recompute", post(routes::trust::recompute))

        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::production()
    };
    init_logging(&log_config)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    info!("KrishiLok Advisory Server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Models dir:    {:?}", config.models.models_dir);
    info!("  Knowledge:     {:?}", config.knowledge.path);
    info!("  Generation:    {}", config.generation.model);

    let services = AdvisoryServices::from_config(&config)?;
    let health = services.health();
    if health.status != "healthy" {
        tracing::warn!("No crop model loaded. Scan submissions will be rejected until models are installed");
    }

    let state = Arc::new(AppState::new(services));
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
