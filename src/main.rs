use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evophisher::api::rate_limit;
use evophisher::config::Config;
use evophisher::engine::Dispatcher;
use evophisher::mailer::SmtpMailer;
use evophisher::AppState;

#[derive(Parser, Debug)]
#[command(name = "evophisher")]
#[command(author, version, about = "Phishing-simulation platform server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "evophisher.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting EvoPhisher v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = evophisher::db::init(&config.server.data_dir).await?;

    // Ensure bootstrap admin user exists if configured
    evophisher::api::auth::ensure_admin_user(
        &db,
        config.auth.admin_email.as_deref(),
        config.auth.admin_password.as_deref(),
    )
    .await?;

    // Initialize metrics recorder
    let metrics_handle = if config.metrics.enabled {
        Some(evophisher::api::metrics::init_metrics())
    } else {
        None
    };

    // SMTP transport shared by the dispatcher and the settings endpoints
    let mailer = Arc::new(SmtpMailer::new(config.email.clone()));
    if !config.email.is_configured() {
        tracing::warn!("SMTP is not configured; campaign dispatch will fail until it is");
    }

    // Create dispatch channel and start the campaign dispatcher
    let (dispatch_tx, dispatch_rx) = mpsc::channel(100);
    let dispatcher = Dispatcher::new(
        db.clone(),
        mailer.clone(),
        config.dispatch.clone(),
        config.server.public_url.clone(),
        dispatch_rx,
    );
    tokio::spawn(async move {
        dispatcher.run().await;
    });

    // Create app state
    let mut state = AppState::new(config.clone(), db.clone(), dispatch_tx, mailer);
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }
    let state = Arc::new(state);

    // Periodically drop stale rate-limit entries
    rate_limit::spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );

    // Create API router
    let app = evophisher::api::create_router(state);

    // Start API server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);
    tracing::info!("Tracking base URL: {}", config.server.public_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
