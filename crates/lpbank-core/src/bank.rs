//! Bank driver.
//!
//! Owns the registry and supervisor and turns transport events into
//! actions. The caller serializes events: one event is processed to
//! completion before the next, so no locking is needed inside.

use lpbank_proto::{Envelope, Origin};
use tracing::{debug, info, warn};

use crate::{
    env::Environment,
    participant::{Connection, ConnectionId, CustomerId, Member, Role},
    registry::ConnectionRegistry,
    router,
    session::{self, PairingState},
    supervisor::DisconnectSupervisor,
};

/// Sent to a connection refused because the bank is full.
const BANK_FULL: &str = "[ THE BANK IS FULL. PLEASE TRY AGAIN LATER ]";

/// Sent to a connection whose first envelope claims to be the bank.
const UNKNOWN_ROLE: &str = "[ PLEASE CONNECT AS A CUSTOMER OR A TELLER ]";

/// Bank configuration.
#[derive(Debug, Clone)]
pub struct BankConfig {
    /// Starting balance of every new customer.
    pub initial_balance: u64,
    /// Maximum connections, registered or not yet identified.
    pub max_connections: usize,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self { initial_balance: 100, max_connections: 1024 }
    }
}

/// Events fed to the bank by the transport.
#[derive(Debug)]
pub enum BankEvent<C> {
    /// A connection was accepted. It is registered once its first envelope
    /// names its role.
    Accepted {
        /// The new connection.
        conn: C,
    },
    /// A complete envelope arrived.
    EnvelopeReceived {
        /// Connection it arrived on.
        conn_id: ConnectionId,
        /// Decoded envelope.
        envelope: Envelope,
    },
    /// The transport noticed a close. Only a hint: eviction still goes
    /// through the sweep.
    ConnectionClosed {
        /// Connection that closed.
        conn_id: ConnectionId,
    },
    /// Periodic timer.
    Tick,
}

/// Actions for the transport to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankAction {
    /// Frame and write an envelope to a connection.
    Send {
        /// Target connection.
        conn_id: ConnectionId,
        /// Envelope to send.
        envelope: Envelope,
    },
    /// Close a connection after flushing pending writes.
    Close {
        /// Target connection.
        conn_id: ConnectionId,
        /// Reason, for logging.
        reason: String,
    },
}

impl BankAction {
    /// Bank-origin notice to one connection.
    pub fn notice(conn_id: ConnectionId, text: impl Into<String>) -> Self {
        Self::Send { conn_id, envelope: Envelope::bank(text) }
    }

    /// Connection this action targets.
    pub fn conn_id(&self) -> ConnectionId {
        match self {
            Self::Send { conn_id, .. } | Self::Close { conn_id, .. } => *conn_id,
        }
    }
}

/// The bank: registry, pairing sessions and disconnect supervision.
pub struct Bank<E, C> {
    env: E,
    config: BankConfig,
    registry: ConnectionRegistry<C>,
    /// Accepted connections that have not yet named their role.
    pending: Vec<C>,
    supervisor: DisconnectSupervisor,
}

impl<E, C> Bank<E, C>
where
    E: Environment,
    C: Connection,
{
    /// Create an empty bank.
    pub fn new(env: E, config: BankConfig) -> Self {
        let registry = ConnectionRegistry::new(config.initial_balance);
        Self { env, config, registry, pending: Vec::new(), supervisor: DisconnectSupervisor::new() }
    }

    /// Process one event and return the resulting actions.
    pub fn process_event(&mut self, event: BankEvent<C>) -> Vec<BankAction> {
        match event {
            BankEvent::Accepted { conn } => self.handle_accept(conn),
            BankEvent::EnvelopeReceived { conn_id, envelope } => {
                let mut actions = self.sweep();
                actions.extend(self.handle_envelope(conn_id, envelope));
                actions
            },
            BankEvent::ConnectionClosed { conn_id } => {
                debug!(conn = conn_id, "close reported");
                self.sweep()
            },
            BankEvent::Tick => self.sweep(),
        }
    }

    /// Run the disconnect sweep.
    pub fn sweep(&mut self) -> Vec<BankAction> {
        self.pending.retain(|c| !c.is_closed());
        self.supervisor.sweep(&mut self.registry)
    }

    /// The registry.
    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// The supervisor's counters.
    pub fn supervisor(&self) -> &DisconnectSupervisor {
        &self.supervisor
    }

    /// Session state of a customer.
    pub fn pairing_state(&self, customer: CustomerId) -> PairingState {
        session::state(&self.registry, customer)
    }

    /// Connections held, identified or not.
    pub fn connection_count(&self) -> usize {
        self.pending.len() + self.registry.len()
    }

    /// Lines describing the bank floor, for the server's own terminal.
    pub fn summary_lines(&self) -> Vec<String> {
        let now = self.env.now();
        let mut lines = vec![format!("LP Bank: {} connection(s)", self.connection_count())];

        lines.push(format!("Tellers ({}):", self.registry.tellers().count()));
        for teller in self.registry.tellers() {
            let status = match (teller.customer(), teller.paired_at()) {
                (Some(customer), Some(since)) => format!(
                    "serving customer {customer} for {}s",
                    now.saturating_duration_since(since).as_secs()
                ),
                (Some(customer), None) => format!("serving customer {customer}"),
                (None, _) => "idle".to_string(),
            };
            lines.push(format!("  {}  {status}", teller.id().short()));
        }

        let waiting: Vec<String> = self.registry.waiting().map(|c| c.id().to_string()).collect();
        lines.push(format!("Waiting customers ({}): {}", waiting.len(), waiting.join(", ")));

        lines.push(format!("Being served ({}):", self.registry.serving().count()));
        for customer in self.registry.serving() {
            let teller = customer.teller().map_or("?", |t| t.short());
            lines.push(format!(
                "  customer {} (balance {}) with teller {teller}",
                customer.id(),
                customer.balance()
            ));
        }

        lines
    }

    fn handle_accept(&mut self, conn: C) -> Vec<BankAction> {
        let conn_id = conn.id();
        if self.connection_count() >= self.config.max_connections {
            warn!(conn = conn_id, limit = self.config.max_connections, "connection limit reached");
            return vec![
                BankAction::notice(conn_id, BANK_FULL),
                BankAction::Close { conn_id, reason: "connection limit reached".to_string() },
            ];
        }

        debug!(conn = conn_id, "connection accepted");
        self.pending.push(conn);
        Vec::new()
    }

    fn handle_envelope(&mut self, conn_id: ConnectionId, envelope: Envelope) -> Vec<BankAction> {
        if let Some(idx) = self.pending.iter().position(|c| c.id() == conn_id) {
            return self.register(idx, envelope);
        }

        let Some(member) = self.registry.member(conn_id) else {
            debug!(conn = conn_id, "envelope from unregistered connection");
            return Vec::new();
        };

        if Origin::from(member.role()) != envelope.origin {
            warn!(conn = conn_id, origin = %envelope.origin, "envelope origin does not match role");
            return Vec::new();
        }

        router::route(&mut self.registry, &member, &envelope.message, self.env.now())
    }

    /// Register a pending connection under the role its first envelope names.
    fn register(&mut self, idx: usize, envelope: Envelope) -> Vec<BankAction> {
        let role = match envelope.origin {
            Origin::Customer => Role::Customer,
            Origin::Teller => Role::Teller,
            Origin::Bank => {
                let conn_id = self.pending.remove(idx).id();
                warn!(conn = conn_id, "client claimed bank origin");
                return vec![
                    BankAction::notice(conn_id, UNKNOWN_ROLE),
                    BankAction::Close { conn_id, reason: "unknown role".to_string() },
                ];
            },
        };

        let conn = self.pending.remove(idx);
        let conn_id = conn.id();

        let (member, welcome) = match role {
            Role::Customer => {
                let id = self.registry.add_customer(conn);
                info!(customer = id, conn = conn_id, "customer joined");
                let text = format!(
                    "[ WELCOME, CUSTOMER {id}. BALANCE: {}. PLEASE WAIT FOR A TELLER ]",
                    self.config.initial_balance
                );
                (Member::Customer(id), text)
            },
            Role::Teller => {
                let id = self.registry.add_teller(conn, self.env.session_id());
                info!(teller = id.short(), conn = conn_id, "teller joined");
                let text = format!(
                    "[ WELCOME, TELLER {}. TYPE \"next\" TO SERVE A CUSTOMER ]",
                    id.short()
                );
                (Member::Teller(id), text)
            },
        };

        let mut actions = vec![BankAction::notice(conn_id, welcome)];
        actions.extend(router::route(&mut self.registry, &member, &envelope.message, self.env.now()));
        actions
    }
}

impl<E, C> std::fmt::Debug for Bank<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bank")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
