use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::subscriber;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use winprov_runner::{run, Cli};

/// Initializes the tracing subscriber, `RUST_LOG` wins over the verbosity flag.
fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    subscriber::set_global_default(subscriber)
        .context("Failed to set global default tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.default_log_filter())?;

    run(cli).await
}
