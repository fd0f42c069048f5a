//! The confab server daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use confab_server::handlers::build_registry;
use confab_server::{Server, ServerContext, ShutdownCoordinator};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "confab-serverd", about = "confab chat server", version)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Log filter (overrides RUST_LOG).
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log_filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = settings::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let ctx = Arc::new(ServerContext::fresh());
    let server = Server::bind(config, ctx, build_registry())
        .await
        .context("binding listener")?;
    info!(addr = %server.local_addr()?, "confab-serverd up");

    let coordinator = ShutdownCoordinator::new();
    let serve = {
        let token = coordinator.token();
        tokio::spawn(async move { server.serve(token).await })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    coordinator.drain(vec![serve], None).await;
    Ok(())
}
