use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use upstream_gateway::config::loader;
use upstream_gateway::helpers::time::system_clock;
use upstream_gateway::observability::routes;
use upstream_gateway::utils::logging;
use upstream_gateway::utils::logging::LogLevel;
use upstream_gateway::Gateway;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file; defaults plus environment when absent
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load config, start logging
    // -------------------------------

    let args = Args::parse();
    let config = loader::load(args.config.as_deref()).await?;
    logging::run(&config, args.log_level);

    // -------------------------------
    // 2. Assemble components
    // -------------------------------

    let gateway = Gateway::build(&config, system_clock())?;
    if gateway.tokens.needs_refresh().await {
        if let Err(e) = gateway.tokens.refresh().await {
            warn!(error = %e, "initial token refresh failed, callers will retry on demand");
        }
    }
    if let Some(expires_at) = gateway.tokens.expires_at().await {
        info!(%expires_at, "bearer token ready");
    }

    // -------------------------------
    // 3. Background work: token refresh, cache and access token sweeps
    // -------------------------------

    let tasks = gateway.start_background(&config);

    // -------------------------------
    // 4. Metrics endpoint
    // -------------------------------

    let shutdown = CancellationToken::new();
    let server = tokio::spawn({
        let server_config = config.server.clone();
        let metrics_config = config.metrics.clone();
        let shutdown = shutdown.clone();
        async move { routes::serve(&server_config, &metrics_config, shutdown).await }
    });

    let task_names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
    info!(tasks = ?task_names, "gateway started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    shutdown.cancel();
    for task in tasks {
        task.stop().await;
    }
    server.await??;
    Ok(())
}
