use anyhow::{Context, Result};
use clap::Parser;
use microsocks5::config::{Cli, Config};
use microsocks5::stats;
use microsocks5::worker::{self, Shared};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli).context("invalid configuration")?;
    init_logging(&config);

    let connect_host = config.connect_host.clone();
    let bridge_port = config.bridge_port;
    let quiet = config.quiet;

    let shared = Arc::new(Shared::new(config));
    let counters = Arc::clone(&shared.counters);

    let stats_task = tokio::spawn(stats::run(counters, quiet));

    let result = match (connect_host, bridge_port) {
        (Some(host), Some(_)) => worker::run_reverse(shared, host).await,
        (None, Some(port)) => worker::run_bridge(shared, port).await,
        (None, None) => worker::run_normal(shared).await,
        (Some(_), None) => unreachable!("Config::from_cli rejects -c without -C"),
    };

    stats_task.abort();
    result.context("server loop exited")?;
    Ok(())
}

fn init_logging(config: &Config) {
    let default_level = match config.quiet {
        true => "error",
        false => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
