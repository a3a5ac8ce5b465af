//! LP Bank server binary.
//!
//! # Usage
//!
//! ```bash
//! lpbank-server --bind 0.0.0.0:3000
//!
//! # Richer customers, chattier logs
//! lpbank-server --initial-balance 500 --log-level debug
//! ```
//!
//! Type `status` on the server terminal to see the floor. Closing stdin
//! (Ctrl-D) shuts the server down.

use std::time::Duration;

use clap::Parser;
use lpbank_core::BankConfig;
use lpbank_server::{Server, ServerRuntimeConfig, console};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// LP Bank chat server
#[derive(Parser, Debug)]
#[command(name = "lpbank-server")]
#[command(about = "Pairs bank customers with tellers over TCP")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Milliseconds between disconnect sweeps
    #[arg(long, default_value = "500")]
    sweep_interval_ms: u64,

    /// Starting balance for every customer
    #[arg(long, default_value = "100")]
    initial_balance: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the console screen.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!("LP Bank server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        sweep_interval: Duration::from_millis(args.sweep_interval_ms),
        bank: BankConfig {
            initial_balance: args.initial_balance,
            max_connections: args.max_connections,
        },
    };

    let server = Server::bind(config).await?;
    let console = tokio::spawn(console::run(server.handle()));

    tracing::info!("Server listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        finished = console => {
            match finished {
                Ok(Ok(())) => tracing::info!("console closed, shutting down"),
                Ok(Err(e)) => tracing::error!("console failed: {}", e),
                Err(e) => tracing::error!("console task panicked: {}", e),
            }
        },
    }

    Ok(())
}
