//! Per-connection I/O.
//!
//! Each accepted stream gets one task that reads chunks into a [`Framer`]
//! and writes frames queued by the bank task. The task is generic over the
//! stream so the simulation harness can drive it with in-memory sockets.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use lpbank_core::{Connection, ConnectionId};
use lpbank_proto::Framer;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{
    BankHandle, ServerError,
    bank_task::{BankCommand, OUTBOUND_QUEUE, Outbound},
};

const READ_BUFFER_SIZE: usize = 4096;

/// Bank-side view of a socket: an id and a closed flag.
///
/// Only the bank task sets the flag, once the I/O task has reported the
/// close or the connection stopped draining its queue.
#[derive(Debug, Clone)]
pub struct TcpConnection {
    id: ConnectionId,
    closed: Arc<AtomicBool>,
}

impl TcpConnection {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self { id, closed: Arc::new(AtomicBool::new(false)) }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Serve one connection until the peer hangs up or the bank closes it.
///
/// # Errors
///
/// Returns a transport error if reading or writing fails, or
/// `BankUnavailable` if the bank task has stopped.
pub async fn serve_connection<S>(stream: S, bank: BankHandle) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let conn = TcpConnection::new(bank.next_conn_id());
    let conn_id = conn.id();
    let (outbound, mut queue) = mpsc::channel(OUTBOUND_QUEUE);

    tracing::debug!(conn = conn_id, "connection accepted");
    bank.send(BankCommand::Accepted { conn, outbound }).await?;

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut framer = Framer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let result = loop {
        tokio::select! {
            // Drain queued frames before reading more from the peer.
            biased;

            next = queue.recv() => match next {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        break Err(e.into());
                    }
                },
                Some(Outbound::Close) | None => break Ok(()),
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    let mut forwarded = Ok(());
                    for envelope in framer.feed(&buf[..n]) {
                        forwarded = bank.send(BankCommand::Envelope { conn_id, envelope }).await;
                        if forwarded.is_err() {
                            break;
                        }
                    }
                    if let Err(e) = forwarded {
                        break Err(e);
                    }
                },
                Err(e) => break Err(e.into()),
            },
        }
    };

    let _ = writer.shutdown().await;
    if framer.dropped() > 0 {
        tracing::debug!(conn = conn_id, dropped = framer.dropped(), "malformed packets discarded");
    }
    tracing::debug!(conn = conn_id, "connection closed");

    // Sent after every envelope above, so the bank sees them all first.
    // The bank may already be gone during shutdown.
    let _ = bank.send(BankCommand::Closed { conn_id }).await;
    result
}
