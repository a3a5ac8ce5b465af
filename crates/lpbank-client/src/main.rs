//! LP Bank terminal client binary.
//!
//! # Usage
//!
//! ```bash
//! lpbank --role customer --connect 127.0.0.1:3000
//! lpbank --role teller --connect 127.0.0.1:3000 --log-level debug 2> teller.log
//! ```

use clap::{Parser, ValueEnum};
use lpbank_client::{ClientError, SessionEnd, Terminal, run_session};
use lpbank_proto::Origin;
use tokio::{io::BufReader, net::TcpStream};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Which side of the counter this terminal is on.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Customer,
    Teller,
}

impl From<Role> for Origin {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Teller => Self::Teller,
        }
    }
}

/// LP Bank terminal client
#[derive(Parser, Debug)]
#[command(name = "lpbank")]
#[command(about = "Chat with the bank as a customer or a teller")]
#[command(version)]
struct Args {
    /// Role to join as
    #[arg(short, long, value_enum)]
    role: Role,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    connect: String,

    /// Log level (trace, debug, info, warn, error); logs go to stderr
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logging stays off by default so it cannot scribble over the screen.
    if let Some(level) = &args.log_level {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    let stream = TcpStream::connect(&args.connect)
        .await
        .map_err(|source| ClientError::Connect { addr: args.connect.clone(), source })?;
    tracing::info!("connected to {}", args.connect);

    let mut terminal = Terminal::new(std::io::stdout());
    let input = BufReader::new(tokio::io::stdin());
    let end = run_session(stream, args.role.into(), input, &mut terminal).await?;

    match end {
        SessionEnd::InputClosed => tracing::info!("input closed"),
        SessionEnd::ServerClosed => tracing::info!("server closed the connection"),
    }

    // A blocked stdin read would otherwise hold the runtime open.
    std::process::exit(0)
}
