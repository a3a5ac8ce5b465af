//! The bank task: sole owner of the [`Bank`].
//!
//! Connection tasks never touch bank state. They send [`BankCommand`]s
//! over a channel and receive encoded frames back on their own outbound
//! queue. One task applying events in arrival order keeps registry
//! mutation serialized without a lock.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use lpbank_core::{Bank, BankAction, BankConfig, BankEvent, Connection, ConnectionId, Environment};
use lpbank_proto::Envelope;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{ServerError, transport::TcpConnection};

/// Capacity of the command channel into the bank task.
const COMMAND_QUEUE: usize = 1024;

/// Frames queued for one connection before it counts as unresponsive.
pub(crate) const OUTBOUND_QUEUE: usize = 1024;

/// Work queued for a connection's writer.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// Encoded frame to write.
    Frame(Bytes),
    /// Flush what is queued, then close.
    Close,
}

/// Commands accepted by the bank task.
#[derive(Debug)]
pub(crate) enum BankCommand {
    Accepted { conn: TcpConnection, outbound: mpsc::Sender<Outbound> },
    Envelope { conn_id: ConnectionId, envelope: Envelope },
    Closed { conn_id: ConnectionId },
    Summary { reply: oneshot::Sender<Vec<String>> },
}

/// A connection as the bank task tracks it.
struct Peer {
    conn: TcpConnection,
    outbound: mpsc::Sender<Outbound>,
}

/// Cloneable handle to a running bank task.
#[derive(Debug, Clone)]
pub struct BankHandle {
    commands: mpsc::Sender<BankCommand>,
    next_conn_id: Arc<AtomicU64>,
}

impl BankHandle {
    /// Allocate an id for a newly accepted connection.
    pub fn next_conn_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Lines describing the bank floor.
    ///
    /// # Errors
    ///
    /// Returns `BankUnavailable` if the bank task has stopped.
    pub async fn summary(&self) -> Result<Vec<String>, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(BankCommand::Summary { reply }).await?;
        rx.await.map_err(|_| ServerError::BankUnavailable)
    }

    pub(crate) async fn send(&self, command: BankCommand) -> Result<(), ServerError> {
        self.commands.send(command).await.map_err(|_| ServerError::BankUnavailable)
    }
}

/// Spawn the bank task.
///
/// The task runs until every [`BankHandle`] is dropped. A sweep runs every
/// `sweep_interval` in addition to the sweep before each inbound envelope.
pub fn spawn_bank<E: Environment>(
    env: E,
    config: BankConfig,
    sweep_interval: Duration,
) -> (BankHandle, JoinHandle<()>) {
    let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
    let bank = Bank::new(env, config);
    let task = tokio::spawn(run(bank, rx, sweep_interval));
    (BankHandle { commands, next_conn_id: Arc::new(AtomicU64::new(1)) }, task)
}

async fn run<E: Environment>(
    mut bank: Bank<E, TcpConnection>,
    mut commands: mpsc::Receiver<BankCommand>,
    sweep_interval: Duration,
) {
    let mut peers: HashMap<ConnectionId, Peer> = HashMap::new();
    let mut ticker = tokio::time::interval(sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let mut actions = tokio::select! {
            command = commands.recv() => match command {
                Some(BankCommand::Accepted { conn, outbound }) => {
                    peers.insert(conn.id(), Peer { conn: conn.clone(), outbound });
                    bank.process_event(BankEvent::Accepted { conn })
                },
                Some(BankCommand::Envelope { conn_id, envelope }) => {
                    bank.process_event(BankEvent::EnvelopeReceived { conn_id, envelope })
                },
                Some(BankCommand::Closed { conn_id }) => {
                    // Queued behind every envelope the connection forwarded,
                    // so flagging it here cannot strand any of them.
                    if let Some(peer) = peers.remove(&conn_id) {
                        peer.conn.mark_closed();
                    }
                    bank.process_event(BankEvent::ConnectionClosed { conn_id })
                },
                Some(BankCommand::Summary { reply }) => {
                    let _ = reply.send(bank.summary_lines());
                    Vec::new()
                },
                None => break,
            },
            _ = ticker.tick() => bank.process_event(BankEvent::Tick),
        };

        while execute_actions(&mut peers, actions) {
            actions = bank.sweep();
        }
    }

    tracing::info!("bank task stopped");
}

/// Hand each action to the writer of its target connection.
///
/// A connection whose queue is full is flagged closed and forgotten.
/// Returns true if that happened, so the caller can sweep it out.
fn execute_actions(peers: &mut HashMap<ConnectionId, Peer>, actions: Vec<BankAction>) -> bool {
    let mut overflowed = false;
    for action in actions {
        let conn_id = action.conn_id();
        let Some(peer) = peers.get(&conn_id) else {
            tracing::debug!(conn = conn_id, "dropping action for departed connection");
            continue;
        };

        let outbound = match action {
            BankAction::Send { envelope, .. } => match lpbank_proto::encode(&envelope) {
                Ok(frame) => Outbound::Frame(frame),
                Err(e) => {
                    tracing::warn!(conn = conn_id, "failed to encode envelope: {}", e);
                    continue;
                },
            },
            BankAction::Close { reason, .. } => {
                tracing::info!(conn = conn_id, "closing connection: {}", reason);
                Outbound::Close
            },
        };

        match peer.outbound.try_send(outbound) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn = conn_id, "outbound queue full, dropping connection");
                if let Some(peer) = peers.remove(&conn_id) {
                    peer.conn.mark_closed();
                }
                overflowed = true;
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn = conn_id, "writer already gone");
            },
        }
    }
    overflowed
}
