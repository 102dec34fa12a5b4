use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use tubecast::cli::CliArgs;
use tubecast::delivery::create_client;
use tubecast::{AppConfig, AppState, router};
use tubecast_cache::CacheStore;
use tubecast_extractor::YtDlp;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    init_logging(&args.log_level);

    if let Err(e) = bootstrap(args) {
        eprintln!("Error: {e:#}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn bootstrap(args: CliArgs) -> Result<()> {
    let config = AppConfig::from_args(&args)?;
    config.prepare_dirs().await?;

    info!(
        bind = %config.bind,
        cache = %config.cache.mode,
        ttl_secs = config.cache.default_ttl.as_secs(),
        max_items = config.max_items,
        max_height = config.max_height,
        "Starting tubecast"
    );

    let cache = CacheStore::from_config(&config.cache)
        .await
        .context("initializing cache")?;
    cache.probe().await;

    let provider = Arc::new(YtDlp::new(config.ytdlp.clone()));
    let http = create_client()?;

    let bind = config.bind;
    let state = AppState::new(config, provider, cache, http);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;
    info!("Listening on http://{bind}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
