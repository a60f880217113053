//! Chat server binary.
//!
//! Run:
//!   cargo run -p chatline-server -- --port 5001
//!   cargo run -p chatline-server -- --bind 0.0.0.0:5001
//!   cargo run -p chatline-server -- --config chatline.toml --case-insensitive

use chatline_server::cli::Cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chatline=info".parse()?))
        .init();

    let config = Cli::parse().into_config()?;

    tracing::info!(
        "Starting chat server on {} (history: {}, nicknames: {:?})",
        config.bind,
        match config.core.max_history {
            0 => "unbounded".to_string(),
            n => format!("last {n}"),
        },
        config.core.case_policy,
    );

    chatline_server::run(config).await
}
