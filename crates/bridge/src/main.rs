use anyhow::Context as _;
use clap::Parser as _;
use mcp_openapi_bridge::config::{Args, Config, LogFormat};
use mcp_openapi_bridge::server::{AppState, router};
use mcp_openapi_bridge::session::SessionCache;
use mcp_openapi_bridge::upstream::HttpConnector;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(Args::parse())?;
    init_tracing(&config.log_level, config.log_format);

    let connector =
        Arc::new(HttpConnector::new(&config.upstream).context("failed to build upstream client")?);
    let sessions = Arc::new(SessionCache::new(connector, config.session.clone()));

    // Warm the catalog so the first request does not pay for the handshake.
    let warmup = Arc::clone(&sessions);
    tokio::spawn(async move {
        if let Err(e) = warmup.snapshot().await {
            tracing::warn!(error = %e, "initial tool discovery failed; retrying on first request");
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        upstream = %config.upstream.url,
        "mcp-openapi-bridge listening"
    );

    let app = router(AppState::new(Arc::clone(&sessions), config.info));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    sessions.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
