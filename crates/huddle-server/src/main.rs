//! # Huddle Server
//!
//! Runs the video-room signaling service: the `/ws` signaling socket plus a
//! few plain HTTP routes (`/health`, `/stats`, `/rooms/{project_id}`), all on
//! one listener.

mod routes;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use clap::Parser;
use huddle_signal::{SignalHub, SignalSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Parser)]
#[command(name = "huddle", version, about = "Video-room signaling server")]
struct Cli {
    /// Config file (TOML, YAML or JSON). Without it, `config.*` in the
    /// working directory is used if present.
    #[arg(long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `server.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = huddle_common::config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing(cli.json_logs);

    tracing::info!("Starting Huddle v{}", env!("CARGO_PKG_VERSION"));

    let settings = SignalSettings::from_config(&config);
    if settings.jwt_secret.is_none() {
        tracing::warn!("auth.jwt_secret is not set; client-asserted user ids are trusted");
    }
    let hub = SignalHub::new(settings);

    let app = Router::new()
        .merge(routes::router(routes::AppState::new(hub.clone())))
        .merge(huddle_signal::build_router(hub))
        .layer(cors_layer(&config.server.frontend_url)?)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::new(
        config.server.host.parse().context("server.host is not an IP address")?,
        config.server.port,
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Signaling listening on ws://{addr}/ws");
    tracing::info!("Allowed origin: {}", config.server.frontend_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, closing listener");
        })
        .await?;

    tracing::info!("Huddle stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// `*` allows any origin; anything else must be a single exact origin.
fn cors_layer(frontend_url: &str) -> anyhow::Result<CorsLayer> {
    let origin = if frontend_url == "*" {
        AllowOrigin::any()
    } else {
        let value: HeaderValue = frontend_url
            .parse()
            .with_context(|| format!("invalid server.frontend_url: {frontend_url}"))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}
