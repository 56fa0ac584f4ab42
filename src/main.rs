use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden::config::Config;
use warden::context::ServiceContext;
use warden::server::build_router;

#[derive(Debug, Parser)]
#[command(name = "warden", about = "Task classification and session-scoped access control service")]
struct Args {
    /// Bind address, overrides WARDEN_HOST
    #[arg(long, env = "WARDEN_HOST")]
    host: Option<String>,

    /// Bind port, overrides WARDEN_PORT
    #[arg(long, env = "WARDEN_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("loading configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx: Arc<ServiceContext> = ServiceContext::new(config);

    ctx.availability.hydrate().await;

    let app = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "warden listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    // In-flight sessions are abandoned on shutdown; they are process-local
    // and a restart starts clean.
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
