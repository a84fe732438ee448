//! Pi Dashboard
//!
//! Main entry point for the dashboard server.

use clap::Parser;
use pi_dashboard::{
    config::DashboardConfig,
    state::AppState,
    web_api,
};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pi-dashboard", version, about = "Local web dashboard for single-board computers")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "pi_dashboard=debug,tower_http=debug"
    } else {
        "pi_dashboard=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Pi Dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = DashboardConfig::load(cli.config.as_deref())?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        camera = config.camera.enabled,
        media = config.media.enabled,
        system = config.system.enabled,
        "Configuration loaded"
    );

    let state = AppState::from_config(config);

    // Start camera feeds
    if let Some(cameras) = &state.cameras {
        cameras.start_all().await;
        tracing::info!(feeds = cameras.list().len(), "Camera facade initialized");
    }

    // Scan media library once at startup
    if let Some(library) = &state.media {
        let count = library.scan().await.len();
        tracing::info!(count, root = %library.root().display(), "Media facade initialized");
    }

    // Start the periodic stats loop
    if let Some(monitor) = &state.system {
        let interval =
            std::time::Duration::from_secs(state.config.system.update_interval_secs.max(1));
        monitor
            .start_monitoring(state.realtime.clone(), interval)
            .await;
        tracing::info!("System facade initialized");
    }

    // Create router with static panel serving
    let static_dir = &state.config.server.static_dir;
    let serve_dir = ServeDir::new(static_dir)
        .not_found_service(ServeFile::new(static_dir.join("index.html")));

    let app = web_api::create_router(state.clone())
        .fallback_service(serve_dir)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Bounded shutdown of the background loops
    if let Some(monitor) = &state.system {
        monitor.stop_monitoring().await;
    }
    if let Some(cameras) = &state.cameras {
        cameras.stop_all().await;
    }
    tracing::info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
