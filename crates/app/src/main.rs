//! Lobby - console client for the matchmaking/chat server
//!
//! Usage: `lobby [host [port]]`. Settings come from the platform config file,
//! then `LOBBY_HOST` / `LOBBY_PORT`, then the command line.

use std::process::ExitCode;

use lobby_core::ClientConfig;
use lobby_net::Connection;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod console;
mod settings;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for the console
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting lobby client");

    let config = match settings::resolve(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = Connection::connect(config).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if console::register(&conn, &mut input).await? {
        console::run(&conn, &mut input).await?;
    }

    conn.shutdown().await;
    Ok(())
}
