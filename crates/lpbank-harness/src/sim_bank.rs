//! The bank as a turmoil host, and peers that talk to it.

use std::{error::Error, io, time::Duration};

use lpbank_core::BankConfig;
use lpbank_proto::{Envelope, Framer, Origin, encode};
use lpbank_server::{serve_connection, spawn_bank};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use turmoil::net::{TcpListener, TcpStream};

use crate::SimEnv;

/// Host name the bank runs under.
pub const BANK_HOST: &str = "bank";

/// Port the bank listens on.
pub const BANK_PORT: u16 = 3000;

/// Sweep period inside simulations.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// `host:port` of the simulated bank.
pub fn bank_address() -> String {
    format!("{BANK_HOST}:{BANK_PORT}")
}

/// Run the bank host: listener, bank task and one task per connection.
///
/// Never returns `Ok`; the simulation ends when its clients finish.
pub async fn run_bank(seed: u64, config: BankConfig) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(format!("0.0.0.0:{BANK_PORT}")).await?;
    let (bank, _task) = spawn_bank(SimEnv::with_seed(seed), config, SWEEP_INTERVAL);

    loop {
        let (stream, peer) = listener.accept().await?;
        let bank = bank.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, bank).await {
                tracing::debug!("connection from {} failed: {}", peer, e);
            }
        });
    }
}

/// A scripted customer or teller inside a simulation.
pub struct SimPeer {
    role: Origin,
    stream: TcpStream,
    framer: Framer,
    inbox: Vec<Envelope>,
}

impl SimPeer {
    /// Connect without announcing a role.
    pub async fn connect(addr: &str, role: Origin) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { role, stream, framer: Framer::new(), inbox: Vec::new() })
    }

    /// Connect and send the joining envelope.
    pub async fn join(addr: &str, role: Origin) -> io::Result<Self> {
        let mut peer = Self::connect(addr, role).await?;
        peer.say("").await?;
        Ok(peer)
    }

    /// Send one line as a single write.
    pub async fn say(&mut self, line: &str) -> io::Result<()> {
        let frame = encode(&Envelope::new(self.role, line)).map_err(io::Error::other)?;
        self.stream.write_all(&frame).await
    }

    /// Send several lines back to back in a single write.
    pub async fn say_all(&mut self, lines: &[String]) -> io::Result<()> {
        let mut burst = Vec::new();
        for line in lines {
            let frame = encode(&Envelope::new(self.role, line.as_str())).map_err(io::Error::other)?;
            burst.extend_from_slice(&frame);
        }
        self.stream.write_all(&burst).await
    }

    /// Half-close: stop sending but keep reading.
    pub async fn close_write(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    /// Send one line split into `pieces` writes, `gap` apart.
    pub async fn say_in_pieces(&mut self, line: &str, pieces: usize, gap: Duration) -> io::Result<()> {
        let frame = encode(&Envelope::new(self.role, line)).map_err(io::Error::other)?;
        let size = frame.len().div_ceil(pieces.max(1)).max(1);
        for piece in frame.chunks(size) {
            self.stream.write_all(piece).await?;
            tokio::time::sleep(gap).await;
        }
        Ok(())
    }

    /// Read until a message equal to `text` arrives.
    pub async fn expect_text(&mut self, text: &str) -> io::Result<Envelope> {
        self.expect(|m| m == text).await
    }

    /// Read until a message starting with `prefix` arrives.
    pub async fn expect_prefix(&mut self, prefix: &str) -> io::Result<Envelope> {
        self.expect(|m| m.starts_with(prefix)).await
    }

    /// Read until a message satisfying `pred` arrives. Earlier messages that
    /// do not match stay queued for later expectations.
    pub async fn expect(&mut self, pred: impl Fn(&str) -> bool) -> io::Result<Envelope> {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(pos) = self.inbox.iter().position(|e| pred(&e.message)) {
                return Ok(self.inbox.remove(pos));
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bank closed the connection"));
            }
            self.inbox.extend(self.framer.feed(&buf[..n]));
        }
    }

    /// Every message received up to and including the first equal to
    /// `last`, in arrival order.
    pub async fn messages_until(&mut self, last: &str) -> io::Result<Vec<String>> {
        let mut buf = [0u8; 1024];
        let mut seen = Vec::new();
        loop {
            while !self.inbox.is_empty() {
                let message = self.inbox.remove(0).message;
                let done = message == last;
                seen.push(message);
                if done {
                    return Ok(seen);
                }
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bank closed the connection"));
            }
            self.inbox.extend(self.framer.feed(&buf[..n]));
        }
    }

    /// Read until the bank closes the connection.
    pub async fn expect_closed(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 1024];
        while self.stream.read(&mut buf).await? > 0 {}
        Ok(())
    }
}
