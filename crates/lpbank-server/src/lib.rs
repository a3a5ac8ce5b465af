//! LP Bank production server.
//!
//! This crate wires the Sans-IO [`Bank`](lpbank_core::Bank) to real sockets:
//! - Tokio TCP listener and one I/O task per connection
//! - A single bank task that owns all bank state
//! - System time and OS randomness
//!
//! ## Architecture
//!
//! ```text
//! lpbank-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ serve_connection   (framing + socket I/O, one task per peer)
//!   ├─ bank task          (Bank + sweep timer, single writer)
//!   └─ console            (operator status screen on stdin/stdout)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bank_task;
pub mod console;
mod error;
mod system_env;
mod transport;

use std::time::Duration;

pub use bank_task::{BankHandle, spawn_bank};
pub use error::ServerError;
use lpbank_core::BankConfig;
pub use system_env::SystemEnv;
use tokio::{net::TcpListener, task::JoinHandle};
pub use transport::{TcpConnection, serve_connection};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// How often the disconnect sweep runs without traffic
    pub sweep_interval: Duration,
    /// Bank configuration (balances, limits)
    pub bank: BankConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            sweep_interval: Duration::from_millis(500),
            bank: BankConfig::default(),
        }
    }
}

/// Production LP Bank server.
pub struct Server {
    listener: TcpListener,
    bank: BankHandle,
    bank_task: JoinHandle<()>,
}

impl Server {
    /// Create and bind a new server and start its bank task.
    ///
    /// # Errors
    ///
    /// Returns error if the sweep interval is zero or binding fails.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.sweep_interval.is_zero() {
            return Err(ServerError::Config("sweep interval must be non-zero".to_string()));
        }

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {e}", config.bind_address))
        })?;
        let (bank, bank_task) = spawn_bank(SystemEnv::new(), config.bank, config.sweep_interval);

        Ok(Self { listener, bank, bank_task })
    }

    /// Handle to the bank task, for the console.
    pub fn handle(&self) -> BankHandle {
        self.bank.clone()
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections until the bank task stops.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);

        let Self { listener, bank, mut bank_task } = self;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("set_nodelay failed for {}: {}", peer, e);
                        }
                        let bank = bank.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, bank).await {
                                tracing::debug!("Connection error from {}: {}", peer, e);
                            }
                        });
                    },
                    Err(e) => tracing::error!("Accept error: {}", e),
                },
                _ = &mut bank_task => return Err(ServerError::BankUnavailable),
            }
        }
    }
}
